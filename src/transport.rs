//! Transport contract and write-path interception.
//!
//! A decorated transport owns the original transport and forwards every
//! write to it after running the message through the identifier's pipeline.
//! Everything else on the original is reached through delegation.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::decorator::CallOptions;
use crate::pipeline::{Pipeline, PipelineError};

/// A sink that writes messages, tagged with a stable identifier.
///
/// Transports sharing an identifier share one pipeline.
pub trait Transport {
    /// Identifier of this transport kind. Empty means undeclared.
    const IDENTIFIER: &'static str = "";

    fn write(&mut self, message: JsonValue, options: &CallOptions) -> Result<(), TransportError>;
}

/// Error type for transport writes
#[derive(Debug)]
pub enum TransportError {
    Pipeline {
        identifier: String,
        source: PipelineError,
    },
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Serialization(err)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Pipeline { identifier, source } => {
                write!(f, "Pipeline for '{}' failed: {}", identifier, source)
            }
            TransportError::Io(e) => write!(f, "IO error: {}", e),
            TransportError::Serialization(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Pipeline { source, .. } => Some(source),
            TransportError::Io(e) => Some(e),
            TransportError::Serialization(e) => Some(e),
        }
    }
}

/// Error raised when a transport type cannot be decorated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptError {
    MissingIdentifier {
        transport: &'static str,
    },
    NoPipeline {
        identifier: String,
    },
}

impl fmt::Display for InterceptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::MissingIdentifier { transport } => {
                write!(f, "Transport {} does not declare an identifier", transport)
            }
            InterceptError::NoPipeline { identifier } => {
                write!(f, "No pipeline compiled for transport identifier '{}'", identifier)
            }
        }
    }
}

impl std::error::Error for InterceptError {}

/// Look up the pipeline for `T` and produce its decorated type.
pub(crate) fn intercept<T: Transport>(
    pipelines: &IndexMap<String, Arc<Pipeline>>,
) -> Result<DecoratedType<T>, InterceptError> {
    if T::IDENTIFIER.is_empty() {
        return Err(InterceptError::MissingIdentifier {
            transport: std::any::type_name::<T>(),
        });
    }

    let pipeline = pipelines
        .get(T::IDENTIFIER)
        .cloned()
        .ok_or_else(|| InterceptError::NoPipeline {
            identifier: T::IDENTIFIER.to_string(),
        })?;

    Ok(DecoratedType {
        pipeline,
        _transport: PhantomData,
    })
}

/// Decorated counterpart of a transport type.
///
/// Produced once per transport kind; [`DecoratedType::wrap`] then decorates
/// any number of instances with the same pipeline.
pub struct DecoratedType<T> {
    pipeline: Arc<Pipeline>,
    _transport: PhantomData<fn() -> T>,
}

impl<T: Transport> DecoratedType<T> {
    pub fn wrap(&self, inner: T) -> DecoratedTransport<T> {
        DecoratedTransport {
            inner,
            pipeline: Arc::clone(&self.pipeline),
        }
    }

    pub fn identifier(&self) -> &'static str {
        T::IDENTIFIER
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl<T> Clone for DecoratedType<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            _transport: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DecoratedType<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratedType")
            .field("transport", &std::any::type_name::<T>())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

/// Transport whose writes pass through a pipeline before reaching `T`.
pub struct DecoratedTransport<T> {
    inner: T,
    pipeline: Arc<Pipeline>,
}

impl<T> DecoratedTransport<T> {
    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

impl<T: Transport> Transport for DecoratedTransport<T> {
    const IDENTIFIER: &'static str = T::IDENTIFIER;

    fn write(&mut self, message: JsonValue, options: &CallOptions) -> Result<(), TransportError> {
        let decorated = self
            .pipeline
            .apply(message, options)
            .map_err(|source| TransportError::Pipeline {
                identifier: T::IDENTIFIER.to_string(),
                source,
            })?;

        tracing::debug!("Forwarding decorated message to '{}'", T::IDENTIFIER);
        self.inner.write(decorated, options)
    }
}

impl<T> Deref for DecoratedTransport<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for DecoratedTransport<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for DecoratedTransport<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratedTransport")
            .field("inner", &self.inner)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::{ClosureDecorator, Plugin};
    use serde_json::json;

    #[derive(Debug, Default)]
    struct Recorder {
        writes: Vec<(JsonValue, CallOptions)>,
        flushed: bool,
    }

    impl Recorder {
        fn flush(&mut self) {
            self.flushed = true;
        }
    }

    impl Transport for Recorder {
        const IDENTIFIER: &'static str = "recorder";

        fn write(&mut self, message: JsonValue, options: &CallOptions) -> Result<(), TransportError> {
            self.writes.push((message, options.clone()));
            Ok(())
        }
    }

    struct Anonymous;

    impl Transport for Anonymous {
        fn write(&mut self, _message: JsonValue, _options: &CallOptions) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn doubling_pipeline(identifier: &str) -> IndexMap<String, Arc<Pipeline>> {
        let plugin = Arc::new(Plugin::new(
            "double",
            Box::new(
                ClosureDecorator::new()
                    .on_configure(|_| Ok(()))
                    .on_decorate(|m, _, _| Ok(json!(m.as_i64().unwrap_or(0) * 2))),
            ),
        ));
        let mut pipelines = IndexMap::new();
        pipelines.insert(
            identifier.to_string(),
            Arc::new(Pipeline::compile(identifier, vec![(plugin, None)])),
        );
        pipelines
    }

    #[test]
    fn test_missing_identifier() {
        let err = intercept::<Anonymous>(&doubling_pipeline("recorder")).unwrap_err();
        assert!(matches!(err, InterceptError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_no_pipeline() {
        let err = intercept::<Recorder>(&doubling_pipeline("console")).unwrap_err();
        assert_eq!(
            err,
            InterceptError::NoPipeline {
                identifier: "recorder".to_string()
            }
        );
    }

    #[test]
    fn test_writes_are_decorated_in_order() {
        let decorated = intercept::<Recorder>(&doubling_pipeline("recorder")).unwrap();
        let mut transport = decorated.wrap(Recorder::default());

        let mut options = CallOptions::new();
        options.insert("level".to_string(), json!("info"));

        transport.write(json!(1), &options).unwrap();
        transport.write(json!(2), &options).unwrap();

        assert_eq!(
            transport.inner().writes,
            vec![(json!(2), options.clone()), (json!(4), options)]
        );
    }

    #[test]
    fn test_other_behaviour_is_delegated() {
        let decorated = intercept::<Recorder>(&doubling_pipeline("recorder")).unwrap();
        let mut transport = decorated.wrap(Recorder::default());

        transport.flush();

        assert!(transport.flushed);
        assert_eq!(<DecoratedTransport<Recorder> as Transport>::IDENTIFIER, "recorder");
        assert!(transport.into_inner().flushed);
    }
}
