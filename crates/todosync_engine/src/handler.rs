//! Message dispatch.

use crate::error::SyncResult;
use crate::strategy::{Resolution, ResolveStrategy};
use std::sync::Arc;
use todosync_protocol::{ChangeEnvelope, OperationKind, RawMessage};
use tracing::error;

/// Decodes raw messages and routes them to a [`ResolveStrategy`].
#[derive(Clone)]
pub struct Handler {
    strategy: Arc<dyn ResolveStrategy>,
}

impl Handler {
    /// Creates a handler dispatching to `strategy`.
    pub fn new(strategy: impl ResolveStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    /// Creates a handler from a shared strategy.
    pub fn from_strategy(strategy: Arc<dyn ResolveStrategy>) -> Self {
        Self { strategy }
    }

    /// Returns the name of the strategy in use.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Decodes `message` and resolves it.
    ///
    /// Decode failures and invalid operations are logged and returned; the
    /// handler never retries.
    pub fn handle(&self, message: &RawMessage) -> SyncResult<Resolution> {
        let event = ChangeEnvelope::from_message(message).map_err(|e| {
            error!(
                topic = %message.topic,
                offset = message.offset,
                error = %e,
                "failed to decode message"
            );
            e
        })?;
        self.dispatch(&event)
    }

    /// Resolves an already decoded event.
    pub fn dispatch(&self, event: &ChangeEnvelope) -> SyncResult<Resolution> {
        match event.kind {
            OperationKind::Create => self.strategy.handle_create(event),
            OperationKind::Update => self.strategy.handle_update(event),
            OperationKind::Delete => self.strategy.handle_delete(event),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;
    use parking_lot::Mutex;
    use todosync_protocol::ProtocolError;
    use todosync_testkit::{key_json, message, raw_message, todo};

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<OperationKind>>,
    }

    impl ResolveStrategy for Arc<Recorder> {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn handle_create(&self, _event: &ChangeEnvelope) -> SyncResult<Resolution> {
            self.calls.lock().push(OperationKind::Create);
            Ok(Resolution::Created)
        }

        fn handle_update(&self, _event: &ChangeEnvelope) -> SyncResult<Resolution> {
            self.calls.lock().push(OperationKind::Update);
            Ok(Resolution::Updated { conflict: false })
        }

        fn handle_delete(&self, _event: &ChangeEnvelope) -> SyncResult<Resolution> {
            self.calls.lock().push(OperationKind::Delete);
            Ok(Resolution::Deleted { conflict: false })
        }
    }

    #[test]
    fn dispatches_on_operation() {
        let recorder = Arc::new(Recorder::default());
        let handler = Handler::new(Arc::clone(&recorder));
        let record = todo(1, "c1", "A", 0);

        handler
            .handle(&message("t", &ChangeEnvelope::create(record.clone())))
            .unwrap();
        handler
            .handle(&message("t", &ChangeEnvelope::update(record.clone(), record.clone())))
            .unwrap();
        let outcome = handler
            .handle(&message("t", &ChangeEnvelope::delete(record)))
            .unwrap();

        assert_eq!(outcome, Resolution::Deleted { conflict: false });
        assert_eq!(
            *recorder.calls.lock(),
            vec![OperationKind::Create, OperationKind::Update, OperationKind::Delete]
        );
        assert_eq!(handler.strategy_name(), "recorder");
    }

    #[test]
    fn invalid_operation_is_not_dispatched() {
        let recorder = Arc::new(Recorder::default());
        let handler = Handler::new(Arc::clone(&recorder));
        let msg = raw_message(
            "t",
            &key_json(1, "c1"),
            r#"{"payload": {"op": "r", "before": null, "after": null}}"#,
        );

        let err = handler.handle(&msg).unwrap_err();

        assert!(matches!(
            err,
            SyncError::Protocol(ProtocolError::InvalidOperation { .. })
        ));
        assert!(recorder.calls.lock().is_empty());
    }

    #[test]
    fn undecodable_message_is_an_error() {
        let handler = Handler::new(Arc::new(Recorder::default()));
        let msg = raw_message("t", "not json", "{}");
        assert!(handler.handle(&msg).unwrap_err().is_message_error());
    }
}
