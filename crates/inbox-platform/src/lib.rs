use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard backend failure: {0}")]
    Backend(String),
}

/// Destination for text copied out of the timeline.
pub trait ClipboardSink: Send + Sync {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Last text written, when the sink can read it back.
    fn text(&self) -> Result<Option<String>, ClipboardError>;
}

impl<C: ClipboardSink + ?Sized> ClipboardSink for Arc<C> {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        (**self).set_text(text)
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        (**self).text()
    }
}

/// Process-local clipboard, shared between clones.
#[derive(Clone, Default)]
pub struct InMemoryClipboard {
    data: Arc<RwLock<Option<String>>>,
}

impl ClipboardSink for InMemoryClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| ClipboardError::Backend("poisoned lock".to_owned()))?;
        *data = Some(text.to_owned());
        Ok(())
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        let data = self
            .data
            .read()
            .map_err(|_| ClipboardError::Backend("poisoned lock".to_owned()))?;
        Ok(data.clone())
    }
}

/// System clipboard. The handle is created lazily and recreated once if a write fails.
#[cfg(feature = "os-clipboard")]
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

#[cfg(feature = "os-clipboard")]
impl ClipboardSink for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| ClipboardError::Backend("poisoned lock".to_owned()))?;

        if let Some(clipboard) = slot.as_mut()
            && clipboard.set_text(text.to_owned()).is_ok()
        {
            return Ok(());
        }

        let mut fresh =
            arboard::Clipboard::new().map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        fresh
            .set_text(text.to_owned())
            .map_err(|err| ClipboardError::Backend(err.to_string()))?;
        *slot = Some(fresh);
        Ok(())
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        let mut slot = self
            .handle
            .lock()
            .map_err(|_| ClipboardError::Backend("poisoned lock".to_owned()))?;
        if slot.is_none() {
            *slot = Some(
                arboard::Clipboard::new()
                    .map_err(|err| ClipboardError::Unavailable(err.to_string()))?,
            );
        }
        match slot.as_mut().map(|clipboard| clipboard.get_text()) {
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(arboard::Error::ContentNotAvailable)) | None => Ok(None),
            Some(Err(err)) => Err(ClipboardError::Backend(err.to_string())),
        }
    }
}

/// Clipboard that records failures instead of aborting, for hosts without a display.
pub struct FallbackClipboard<P: ClipboardSink, F: ClipboardSink> {
    primary: P,
    fallback: F,
    last_error: Mutex<Option<ClipboardError>>,
}

impl<P: ClipboardSink, F: ClipboardSink> FallbackClipboard<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            last_error: Mutex::new(None),
        }
    }

    /// Error from the most recent primary write that fell back.
    pub fn last_error(&self) -> Option<ClipboardError> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }
}

impl<P: ClipboardSink, F: ClipboardSink> ClipboardSink for FallbackClipboard<P, F> {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        match self.primary.set_text(text) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Ok(mut slot) = self.last_error.lock() {
                    *slot = Some(err);
                }
                self.fallback.set_text(text)
            }
        }
    }

    fn text(&self) -> Result<Option<String>, ClipboardError> {
        match self.primary.text() {
            Ok(Some(text)) => Ok(Some(text)),
            _ => self.fallback.text(),
        }
    }
}
