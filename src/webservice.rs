//! Service-endpoint invocation adapter.
//!
//! A call through a [`ServiceEndpoint`](crate::InterfaceType::ServiceEndpoint)
//! view carries two arguments: the raw message context and the unmarshalling
//! interceptor that turns it into business arguments. The container picks the
//! message-context flavor by inspecting the argument's runtime type and splices
//! the interceptor onto the end of the method's chain for that call only.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::BoxError;
use crate::interceptor::{Interceptor, Invocation, Next};
use crate::value::{Args, BeanResult, Value};

/// Common surface of both message-context flavors.
pub trait MessageContext: Send + Sync {
    fn flavor(&self) -> &'static str;

    fn property(&self, name: &str) -> Option<String>;

    fn set_property(&self, name: &str, value: String);

    /// Takes the decoded request parameters, leaving none behind.
    fn take_request(&self) -> Option<Args>;

    fn set_response(&self, value: Option<Value>);

    fn take_response(&self) -> Option<Value>;
}

#[derive(Default)]
struct Exchange {
    properties: Mutex<HashMap<String, String>>,
    request: Mutex<Option<Args>>,
    response: Mutex<Option<Value>>,
}

impl Exchange {
    fn with_request(request: Args) -> Self {
        Self {
            request: Mutex::new(Some(request)),
            ..Self::default()
        }
    }
}

macro_rules! message_context {
    ($ty:ident, $flavor:literal) => {
        impl MessageContext for $ty {
            fn flavor(&self) -> &'static str {
                $flavor
            }

            fn property(&self, name: &str) -> Option<String> {
                self.exchange.properties.lock().get(name).cloned()
            }

            fn set_property(&self, name: &str, value: String) {
                self.exchange.properties.lock().insert(name.to_string(), value);
            }

            fn take_request(&self) -> Option<Args> {
                self.exchange.request.lock().take()
            }

            fn set_response(&self, value: Option<Value>) {
                *self.exchange.response.lock() = value;
            }

            fn take_response(&self) -> Option<Value> {
                self.exchange.response.lock().take()
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("properties", &*self.exchange.properties.lock())
                    .field("has_request", &self.exchange.request.lock().is_some())
                    .field("has_response", &self.exchange.response.lock().is_some())
                    .finish()
            }
        }
    };
}

/// Current message-context flavor, addressed by operation name.
pub struct JaxWsMessageContext {
    operation: String,
    exchange: Exchange,
}

impl JaxWsMessageContext {
    pub fn new(operation: impl Into<String>, request: Args) -> Arc<Self> {
        Arc::new(Self {
            operation: operation.into(),
            exchange: Exchange::with_request(request),
        })
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

message_context!(JaxWsMessageContext, "jaxws");

/// Legacy message-context flavor, addressed by SOAP action.
pub struct JaxRpcMessageContext {
    soap_action: Option<String>,
    exchange: Exchange,
}

impl JaxRpcMessageContext {
    pub fn new(soap_action: Option<String>, request: Args) -> Arc<Self> {
        Arc::new(Self {
            soap_action,
            exchange: Exchange::with_request(request),
        })
    }

    pub fn soap_action(&self) -> Option<&str> {
        self.soap_action.as_deref()
    }
}

message_context!(JaxRpcMessageContext, "jaxrpc");

/// The message context of a service-endpoint call.
#[derive(Debug, Clone)]
pub enum ServiceMessage {
    JaxWs(Arc<JaxWsMessageContext>),
    JaxRpc(Arc<JaxRpcMessageContext>),
}

impl ServiceMessage {
    /// Recognises either flavor inside a raw call argument.
    pub fn from_value(value: Value) -> Result<Self, Value> {
        let value = match value.downcast::<Arc<JaxWsMessageContext>>() {
            Ok(ctx) => return Ok(ServiceMessage::JaxWs(*ctx)),
            Err(other) => other,
        };
        match value.downcast::<Arc<JaxRpcMessageContext>>() {
            Ok(ctx) => Ok(ServiceMessage::JaxRpc(*ctx)),
            Err(other) => Err(other),
        }
    }

    pub fn context(&self) -> &dyn MessageContext {
        match self {
            ServiceMessage::JaxWs(ctx) => ctx.as_ref(),
            ServiceMessage::JaxRpc(ctx) => ctx.as_ref(),
        }
    }
}

/// Unmarshalling interceptor for service-endpoint calls.
///
/// Replaces the call arguments with the message's decoded request, then
/// writes the business result into the message response. The call itself
/// returns no value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParameterUnmarshaller;

impl ParameterUnmarshaller {
    pub fn handle() -> Arc<dyn Interceptor> {
        Arc::new(ParameterUnmarshaller)
    }
}

impl Interceptor for ParameterUnmarshaller {
    fn around_invoke(&self, inv: &mut Invocation<'_>, next: Next<'_>) -> BeanResult {
        let message = inv
            .message()?
            .cloned()
            .ok_or_else(|| -> BoxError { "service-endpoint call without a message context".into() })?;
        let request = message.context().take_request().unwrap_or_default();
        inv.set_args(request);
        let response = next.proceed(inv)?;
        message.context().set_response(response);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_is_picked_by_runtime_type() {
        let ws: Value = Box::new(JaxWsMessageContext::new("greet", Args::new()));
        let rpc: Value = Box::new(JaxRpcMessageContext::new(Some("urn:greet".into()), Args::new()));
        let neither: Value = Box::new(5u32);

        assert!(matches!(ServiceMessage::from_value(ws), Ok(ServiceMessage::JaxWs(_))));
        match ServiceMessage::from_value(rpc) {
            Ok(ServiceMessage::JaxRpc(ctx)) => assert_eq!(ctx.soap_action(), Some("urn:greet")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(ServiceMessage::from_value(neither).is_err());
    }

    #[test]
    fn request_is_taken_once_and_response_round_trips() {
        let ctx = JaxWsMessageContext::new("greet", Args::new().with("bob".to_string()));
        ctx.set_property("soap.header", "x".to_string());

        let message = ServiceMessage::JaxWs(ctx.clone());
        let request = message.context().take_request().unwrap();
        assert_eq!(request.get::<String>(0).unwrap(), "bob");
        assert!(message.context().take_request().is_none());

        message.context().set_response(Some(Box::new(3u8)));
        assert_eq!(*ctx.take_response().unwrap().downcast::<u8>().unwrap(), 3);
        assert_eq!(ctx.property("soap.header").as_deref(), Some("x"));
        assert_eq!(message.context().flavor(), "jaxws");
    }
}
