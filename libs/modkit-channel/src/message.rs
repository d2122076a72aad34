//! Outgoing requests, incoming replies and the property bag they carry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use http::HeaderMap;

type Boxed = Box<dyn Any + Send + Sync>;

/// Per-message property bag keyed by well-known property name.
///
/// Values are stored type-erased and downcast on read; a lookup with the wrong
/// type behaves like a missing property.
#[derive(Default)]
pub struct MessageProperties {
    entries: HashMap<String, Boxed>,
}

impl MessageProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the property stored under `name`.
    pub fn insert<T>(&mut self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.entries.insert(name.into(), Box::new(value));
    }

    #[must_use]
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.entries.get(name)?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.entries.get_mut(name)?.downcast_mut::<T>()
    }

    /// Return the property under `name`, attaching `T::default()` first when
    /// it is absent or holds a value of another type.
    pub fn get_or_default<T>(&mut self, name: &str) -> &mut T
    where
        T: Any + Send + Sync + Default,
    {
        let slot = self
            .entries
            .entry(name.to_owned())
            .or_insert_with(|| Box::new(T::default()));
        if !slot.is::<T>() {
            *slot = Box::new(T::default());
        }
        slot.downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("slot `{name}` was just populated with the requested type"))
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MessageProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Transport header bag attached to an outgoing request.
#[derive(Debug, Default, Clone)]
pub struct HttpRequestProperty {
    pub headers: HeaderMap,
}

impl HttpRequestProperty {
    /// Well-known property name the bag is stored under.
    pub const NAME: &'static str = "httpRequest";

    /// Reuse the request's header bag or attach a new, empty one.
    pub fn get_or_insert(properties: &mut MessageProperties) -> &mut Self {
        properties.get_or_default::<Self>(Self::NAME)
    }

    #[must_use]
    pub fn get(properties: &MessageProperties) -> Option<&Self> {
        properties.get::<Self>(Self::NAME)
    }
}

/// Request leaving the process through a channel.
#[derive(Debug)]
pub struct RequestMessage {
    pub action: String,
    pub body: Bytes,
    pub properties: MessageProperties,
}

impl RequestMessage {
    pub fn new(action: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            action: action.into(),
            body: body.into(),
            properties: MessageProperties::new(),
        }
    }

    /// Headers of the attached [`HttpRequestProperty`], if any.
    #[must_use]
    pub fn http_headers(&self) -> Option<&HeaderMap> {
        HttpRequestProperty::get(&self.properties).map(|p| &p.headers)
    }
}

/// Reply received for a [`RequestMessage`].
#[derive(Debug)]
pub struct ReplyMessage {
    pub action: String,
    pub body: Bytes,
    pub properties: MessageProperties,
}

impl ReplyMessage {
    pub fn new(action: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            action: action.into(),
            body: body.into(),
            properties: MessageProperties::new(),
        }
    }
}
