use crate::serializer::*;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves a serializer by MIME type.
///
/// Lookups ignore MIME parameters (`; charset=utf-8`) and case. A MIME type with no
/// registered serializer resolves to the default one.
#[derive(Debug, Clone)]
pub struct SerializerProvider {
    default_mime: String,
    serializers: HashMap<String, Arc<dyn Serializer>>,
}

fn normalize(mime: &str) -> String {
    mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

impl SerializerProvider {
    /// The serializer for `default_mime` must be registered before the first lookup.
    pub fn new(default_mime: &str) -> Self {
        Self { default_mime: normalize(default_mime), serializers: HashMap::new() }
    }

    /// Register under the serializer's own MIME type.
    pub fn register(&mut self, serializer: Arc<dyn Serializer>) -> &mut Self {
        let mime = serializer.mime_type();
        self.register_as(mime, serializer)
    }

    /// Register under an alias MIME type, replacing any earlier registration.
    pub fn register_as(&mut self, mime: &str, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializers.insert(normalize(mime), serializer);
        self
    }

    /// The serializer registered for exactly this MIME type.
    pub fn find(&self, mime: &str) -> Option<&Arc<dyn Serializer>> {
        self.serializers.get(&normalize(mime))
    }

    /// Falls back to the default serializer, or None if it was never registered.
    pub fn get(&self, mime: &str) -> Option<&Arc<dyn Serializer>> {
        if let Some(s) = self.find(mime) {
            return Some(s);
        }
        warn!("no serializer for mime type {:?}, using {}", mime, self.default_mime);
        self.serializers.get(&self.default_mime)
    }

    #[inline]
    pub fn default_mime(&self) -> &str {
        &self.default_mime
    }

    pub fn default_serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializers.get(&self.default_mime)
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.serializers.keys().map(|k| k.as_str())
    }
}

/// All four formats in their lenient form, with the binary protocol as default.
pub fn default_provider() -> SerializerProvider {
    let binary: Arc<dyn Serializer> = Arc::new(BinarySerializer::default());
    let mut provider = SerializerProvider::new(BINARY_MIME_TYPE);
    provider
        .register(binary.clone())
        .register_as(THRIFT_MIME_TYPE, binary)
        .register(Arc::new(FastBinarySerializer::default()))
        .register(Arc::new(JsonSerializer::default()))
        .register(Arc::new(JsonSerializer::named()))
        .register(Arc::new(PrettySerializer::default()));
    provider
}
