use std::sync::atomic::{AtomicBool, Ordering};

/// A value meant to be acted on once, even when several observers see it.
///
/// Channels that replay their latest value (such as `tokio::sync::watch`)
/// wrap notifications in `Event` so a late subscriber does not react to a
/// failure that was already shown.
#[derive(Debug)]
pub struct Event<T> {
    content: T,
    handled: AtomicBool,
}

impl<T> Event<T> {
    pub fn new(content: T) -> Self {
        Self { content, handled: AtomicBool::new(false) }
    }

    /// Returns the content the first time it is called, `None` afterwards.
    pub fn take(&self) -> Option<&T> {
        if self.handled.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(&self.content)
        }
    }

    pub fn peek(&self) -> &T {
        &self.content
    }

    pub fn has_been_handled(&self) -> bool {
        self.handled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_yields_once() {
        let event = Event::new("refresh failed".to_owned());
        assert!(!event.has_been_handled());
        assert_eq!(event.take().map(String::as_str), Some("refresh failed"));
        assert_eq!(event.take(), None);
        assert!(event.has_been_handled());
        assert_eq!(event.peek(), "refresh failed");
    }
}
