//! Dual-sink state persistence: primary store with a fallback copy.

use tracing::{error, warn};

use crate::domain::error::TraderError;
use crate::domain::portfolio::PortfolioState;
use crate::ports::store_port::StateStore;

/// Saves to `primary`; if that fails, writes `fallback` and still reports
/// the primary failure as [`TraderError::Persistence`].
///
/// Loads the copy with the higher `revision`. A fallback copy newer than
/// the primary one is written back to the primary.
pub struct FallbackStore {
    primary: Box<dyn StateStore>,
    fallback: Box<dyn StateStore>,
}

impl FallbackStore {
    pub fn new(primary: Box<dyn StateStore>, fallback: Box<dyn StateStore>) -> Self {
        Self { primary, fallback }
    }
}

impl StateStore for FallbackStore {
    fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
        let primary = match self.primary.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "primary state load failed, reading fallback");
                return self.fallback.load();
            }
        };
        let Some(primary) = primary else {
            return self.fallback.load();
        };

        match self.fallback.load() {
            Ok(Some(fallback)) if fallback.revision > primary.revision => {
                warn!(
                    primary = primary.revision,
                    fallback = fallback.revision,
                    "fallback state is newer, resyncing primary"
                );
                if let Err(e) = self.primary.save(&fallback) {
                    error!(error = %e, "primary resync failed");
                }
                Ok(Some(fallback))
            }
            Ok(_) => Ok(Some(primary)),
            Err(e) => {
                warn!(error = %e, "fallback state load failed, using primary");
                Ok(Some(primary))
            }
        }
    }

    fn save(&self, state: &PortfolioState) -> Result<(), TraderError> {
        let primary_err = match self.primary.save(state) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        error!(error = %primary_err, "primary state save failed");

        let fallback_saved = match self.fallback.save(state) {
            Ok(()) => {
                warn!("state written to fallback store");
                true
            }
            Err(e) => {
                error!(error = %e, "fallback state save failed");
                false
            }
        };

        Err(TraderError::Persistence {
            reason: primary_err.to_string(),
            fallback_saved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MemoryStore {
        state: Rc<RefCell<Option<PortfolioState>>>,
        fail_load: bool,
        fail_save: bool,
    }

    impl StateStore for MemoryStore {
        fn load(&self) -> Result<Option<PortfolioState>, TraderError> {
            if self.fail_load {
                return Err(TraderError::Database {
                    reason: "connection refused".into(),
                });
            }
            Ok(self.state.borrow().clone())
        }

        fn save(&self, state: &PortfolioState) -> Result<(), TraderError> {
            if self.fail_save {
                return Err(TraderError::Database {
                    reason: "connection refused".into(),
                });
            }
            *self.state.borrow_mut() = Some(state.clone());
            Ok(())
        }
    }

    fn state() -> PortfolioState {
        PortfolioState::new(1_000.0, "Balanced")
    }

    #[test]
    fn save_uses_primary_only_when_it_succeeds() {
        let primary = MemoryStore::default();
        let fallback = MemoryStore::default();
        let store = FallbackStore::new(Box::new(primary.clone()), Box::new(fallback.clone()));

        store.save(&state()).unwrap();

        assert_eq!(*primary.state.borrow(), Some(state()));
        assert!(fallback.state.borrow().is_none());
    }

    #[test]
    fn primary_failure_writes_fallback_and_surfaces_error() {
        let primary = MemoryStore {
            fail_save: true,
            ..Default::default()
        };
        let fallback = MemoryStore::default();
        let store = FallbackStore::new(Box::new(primary), Box::new(fallback.clone()));

        let err = store.save(&state()).unwrap_err();

        assert!(matches!(err, TraderError::Persistence { fallback_saved: true, .. }));
        assert_eq!(*fallback.state.borrow(), Some(state()));
    }

    #[test]
    fn both_failing_reports_fallback_not_saved() {
        let failing = MemoryStore {
            fail_save: true,
            ..Default::default()
        };
        let store = FallbackStore::new(Box::new(failing.clone()), Box::new(failing));

        let err = store.save(&state()).unwrap_err();
        assert!(matches!(err, TraderError::Persistence { fallback_saved: false, .. }));
    }

    #[test]
    fn load_falls_back_when_primary_empty_or_failing() {
        let fallback = MemoryStore::default();
        fallback.save(&state()).unwrap();

        let empty = FallbackStore::new(Box::new(MemoryStore::default()), Box::new(fallback.clone()));
        assert_eq!(empty.load().unwrap(), Some(state()));

        let broken = MemoryStore {
            fail_load: true,
            ..Default::default()
        };
        let failing = FallbackStore::new(Box::new(broken), Box::new(fallback));
        assert_eq!(failing.load().unwrap(), Some(state()));
    }

    fn revision(strategy: &str, revision: u64) -> PortfolioState {
        let mut state = PortfolioState::new(1.0, strategy);
        state.revision = revision;
        state
    }

    #[test]
    fn newer_fallback_wins_after_primary_recovers() {
        let primary = MemoryStore::default();
        let fallback = MemoryStore::default();
        let healthy = FallbackStore::new(Box::new(primary.clone()), Box::new(fallback.clone()));
        healthy.save(&revision("week1", 1)).unwrap();

        let down = MemoryStore {
            state: primary.state.clone(),
            fail_save: true,
            ..Default::default()
        };
        let degraded = FallbackStore::new(Box::new(down), Box::new(fallback.clone()));
        assert!(degraded.save(&revision("week2", 2)).is_err());

        let loaded = healthy.load().unwrap().unwrap();
        assert_eq!(loaded.strategy, "week2");
        assert_eq!(primary.state.borrow().as_ref().unwrap().strategy, "week2");
    }

    #[test]
    fn stale_fallback_does_not_override_primary() {
        let primary = MemoryStore::default();
        let fallback = MemoryStore::default();
        fallback.save(&revision("week2", 2)).unwrap();
        primary.save(&revision("week3", 3)).unwrap();

        let store = FallbackStore::new(Box::new(primary), Box::new(fallback.clone()));
        assert_eq!(store.load().unwrap().unwrap().strategy, "week3");
        assert_eq!(fallback.state.borrow().as_ref().unwrap().strategy, "week2");
    }
}
