//! Per-request context handed to middleware and route handlers.
//!
//! A [`Context`] owns the parsed [`Request`], a read-only view of the state
//! shared by every request (for the review server, the `ReviewService`) and a
//! per-request [`Extensions`] map that middleware uses to pass values down the
//! chain, such as the [`RequestId`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::Request;

/// Type-keyed value map. One value per type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// Process-unique identifier of one request, echoed in `X-Request-Id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Everything a handler can see about the request it is serving.
pub struct Context {
    request: Request,
    state: Arc<Extensions>,
    extensions: Extensions,
}

impl Context {
    /// Context with no shared state.
    pub fn new(request: Request) -> Self {
        Self::with_state(request, Arc::new(Extensions::new()))
    }

    pub fn with_state(request: Request, state: Arc<Extensions>) -> Self {
        Self {
            request,
            state,
            extensions: Extensions::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Shared application state registered on the router.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The id assigned by the request logger, when that middleware runs.
    pub fn request_id(&self) -> Option<RequestId> {
        self.extensions.get::<RequestId>().copied()
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn request(raw: &[u8]) -> Request {
        let (req, head_len) = Request::parse(raw).unwrap();
        req.with_body(raw[head_len..].to_vec().into())
    }

    #[test]
    fn extensions_are_keyed_by_type() {
        let mut ext = Extensions::new();
        assert!(ext.insert(RequestId(1)).is_none());
        assert_eq!(ext.insert(RequestId(2)), Some(RequestId(1)));
        ext.insert(String::from("model"));

        assert_eq!(ext.get::<RequestId>(), Some(&RequestId(2)));
        assert_eq!(ext.get::<String>().map(String::as_str), Some("model"));
        assert!(!ext.contains::<u32>());
    }

    #[test]
    fn shared_state_is_visible() {
        let mut state = Extensions::new();
        state.insert(42u32);
        let ctx = Context::with_state(request(b"GET / HTTP/1.1\r\n\r\n"), Arc::new(state));
        assert_eq!(ctx.state::<u32>(), Some(&42));
        assert!(ctx.state::<String>().is_none());
    }

    #[test]
    fn request_id_comes_from_extensions() {
        let mut ctx = Context::new(request(b"GET / HTTP/1.1\r\n\r\n"));
        assert!(ctx.request_id().is_none());
        ctx.extensions_mut().insert(RequestId(255));
        assert_eq!(ctx.request_id().map(|id| id.to_string()).as_deref(), Some("000000ff"));
    }

    #[test]
    fn json_body() {
        #[derive(Deserialize)]
        struct Payload {
            text: String,
        }

        let ctx = Context::new(request(
            b"POST / HTTP/1.1\r\nContent-Length: 12\r\n\r\n{\"text\":\"x\"}",
        ));
        let payload: Payload = ctx.json().unwrap();
        assert_eq!(payload.text, "x");
    }
}
