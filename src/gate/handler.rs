use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::security::GuardError;

/// A typed request payload. Deserialization checks the shape; `validate`
/// checks what serde cannot express.
pub trait CommandRequest: DeserializeOwned + Send + 'static {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Business logic behind a command name.
#[async_trait]
pub trait Command: Send + Sync + 'static {
    type Request: CommandRequest;
    type Response: Serialize + Send;

    async fn run(&self, request: Self::Request) -> anyhow::Result<Self::Response>;
}

/// Untyped view of a command, as the gate sees it.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, payload: Value) -> Result<Value, GuardError>;
}

#[async_trait]
impl<C: Command> CommandHandler for C {
    async fn call(&self, payload: Value) -> Result<Value, GuardError> {
        let request: C::Request =
            serde_json::from_value(payload).map_err(|e| GuardError::Schema(e.to_string()))?;
        request.validate().map_err(GuardError::Schema)?;

        let response = self.run(request).await.map_err(into_guard_error)?;
        serde_json::to_value(response)
            .map_err(|e| GuardError::Handler(format!("response not serializable: {}", e)))
    }
}

/// Keep a [`GuardError`] raised inside a handler as-is; anything else is a
/// handler failure.
pub fn into_guard_error(err: anyhow::Error) -> GuardError {
    match err.downcast::<GuardError>() {
        Ok(guard) => guard,
        Err(other) => GuardError::handler(other),
    }
}
