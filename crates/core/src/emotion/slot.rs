use crate::config::ClassifierConfig;
use crate::emotion::{select_classifier, ClassifierKind, EmotionClassifier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Loader = Box<dyn Fn() -> Arc<dyn EmotionClassifier> + Send + Sync>;

enum SlotState {
    Empty,
    Ready(Arc<dyn EmotionClassifier>),
    Closed,
}

/// Lazily loaded, shared classifier instance.
///
/// The first `get` runs the loader while holding the lock, so callers that
/// arrive during warm-up wait for that load instead of starting their own.
/// After that the instance is read-only and handed out as an `Arc`. The
/// selection made by that load, including a fallback to the rule-based
/// classifier, holds until `shutdown`; the slot never loads twice.
pub struct ClassifierSlot {
    loader: Loader,
    state: Mutex<SlotState>,
    loads: AtomicUsize,
}

impl ClassifierSlot {
    /// Slot that loads the learned model, falling back to the rule-based
    /// classifier when it is unavailable.
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_loader(move || -> Arc<dyn EmotionClassifier> {
            Arc::new(select_classifier(&config))
        })
    }

    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> Arc<dyn EmotionClassifier> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            state: Mutex::new(SlotState::Empty),
            loads: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("classifier slot lock was poisoned; recovering and continuing");
                poisoned.into_inner()
            }
        }
    }

    /// Shared instance, loading it on first use. `None` once shut down.
    pub fn get(&self) -> Option<Arc<dyn EmotionClassifier>> {
        let mut guard = self.lock();
        match &*guard {
            SlotState::Ready(classifier) => return Some(Arc::clone(classifier)),
            SlotState::Closed => return None,
            SlotState::Empty => {}
        }
        let classifier = (self.loader)();
        self.loads.fetch_add(1, Ordering::Relaxed);
        *guard = SlotState::Ready(Arc::clone(&classifier));
        Some(classifier)
    }

    /// Active variant, without triggering a load.
    pub fn loaded_kind(&self) -> Option<ClassifierKind> {
        match &*self.lock() {
            SlotState::Ready(classifier) => Some(classifier.kind()),
            SlotState::Empty | SlotState::Closed => None,
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock(), SlotState::Closed)
    }

    /// Release the cached instance and close the slot. In-flight holders
    /// keep their `Arc`; later `get` calls return `None`.
    pub fn shutdown(&self) -> Option<Arc<dyn EmotionClassifier>> {
        let previous = std::mem::replace(&mut *self.lock(), SlotState::Closed);
        match previous {
            SlotState::Ready(classifier) => {
                tracing::debug!("emotion classifier released");
                Some(classifier)
            }
            SlotState::Empty | SlotState::Closed => None,
        }
    }
}
