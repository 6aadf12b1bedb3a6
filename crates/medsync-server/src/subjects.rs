use std::sync::Arc;

use medsync_dispatch::{CollectionSubject, SubjectRegistry, UserCollectionSubject};

/// The application's registered subjects. Handed to the REST handlers so
/// domain mutations can publish into the dispatch engine; this is the only
/// coupling between the CRUD layer and the fan-out core.
#[derive(Clone)]
pub struct DomainSubjects {
    /// Broadcast add/update/delete of medications.
    pub medications: Arc<CollectionSubject>,
    /// Per-user dose add/update/delete.
    pub doses: Arc<UserCollectionSubject>,
    /// Per-user recomputed dose summaries.
    pub dose_summaries: Arc<UserCollectionSubject>,
}

impl DomainSubjects {
    /// Register all domain subjects into the given registry.
    pub fn build(registry: &mut SubjectRegistry) -> Self {
        Self {
            medications: CollectionSubject::register("medications", registry),
            doses: UserCollectionSubject::register("doses", registry),
            dose_summaries: UserCollectionSubject::register("doseSummaries", registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_all_titles() {
        let mut registry = SubjectRegistry::new(16);
        let subjects = DomainSubjects::build(&mut registry);
        assert_eq!(registry.len(), 3);
        assert!(registry.get("medications").is_some());
        assert!(registry.get("doses").is_some());
        assert!(registry.get("doseSummaries").is_some());
        drop(subjects);
    }
}
