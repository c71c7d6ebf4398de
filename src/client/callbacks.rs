//! Side-effect hooks fired once per resolved, non-superseded call.

use super::error_classification::ClassifiedError;
use std::fmt;
use std::sync::Arc;

pub type SuccessHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&ClassifiedError) + Send + Sync>;
pub type FinallyHook = Arc<dyn Fn() + Send + Sync>;

pub struct Callbacks<T> {
    pub on_success: Option<SuccessHook<T>>,
    pub on_error: Option<ErrorHook>,
    pub on_finally: Option<FinallyHook>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            on_success: None,
            on_error: None,
            on_finally: None,
        }
    }
}

impl<T> Clone for Callbacks<T> {
    fn clone(&self) -> Self {
        Self {
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            on_finally: self.on_finally.clone(),
        }
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finally", &self.on_finally.is_some())
            .finish()
    }
}

impl<T> Callbacks<T> {
    pub(crate) fn succeeded(&self, data: &T) {
        if let Some(hook) = &self.on_success {
            hook(data);
        }
        self.finished();
    }

    pub(crate) fn failed(&self, err: &ClassifiedError) {
        if let Some(hook) = &self.on_error {
            hook(err);
        }
        self.finished();
    }

    fn finished(&self) {
        if let Some(hook) = &self.on_finally {
            hook();
        }
    }
}
