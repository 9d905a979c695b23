//! Layer and protocol registry.
//!
//! The registry is the fixed forwarding pipeline: an ordered sequence of
//! layers, each with an ordered sequence of protocols. Registration order is
//! pipeline order, and the predecessor of a layer is simply the layer
//! registered before it. The registry is built once at startup and is
//! read-only afterwards.

use std::fmt;

use tracing::{debug, warn};

use crate::protocol::{LacpEvaluator, ProtocolEvaluator, ProtocolPrecedence, PROTOCOL_LACP};
use crate::state::{layer_owner_key, layer_state_key};

/// Interface health layer (link faults, unidirectional links).
pub const LAYER_HEALTH: &str = "health";

/// Port security layer (authentication).
pub const LAYER_SECURITY: &str = "security";

/// Link aggregation layer.
pub const LAYER_AGGREGATION: &str = "aggregation";

/// Position of a layer in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerId(usize);

impl LayerId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A protocol registered on exactly one layer.
pub struct Protocol {
    name: String,
    precedence: ProtocolPrecedence,
    layer: LayerId,
    evaluator: Box<dyn ProtocolEvaluator>,
}

impl Protocol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn precedence(&self) -> ProtocolPrecedence {
        self.precedence
    }

    /// The layer this protocol belongs to.
    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn evaluator(&self) -> &dyn ProtocolEvaluator {
        self.evaluator.as_ref()
    }
}

impl fmt::Debug for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("name", &self.name)
            .field("precedence", &self.precedence)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}

/// A stage of the forwarding decision pipeline.
#[derive(Debug)]
pub struct Layer {
    name: String,
    state_key: String,
    owner_key: String,
    protocols: Vec<Protocol>,
}

impl Layer {
    /// Creates a layer with no protocols. Map keys derive from the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            state_key: layer_state_key(&name),
            owner_key: layer_owner_key(&name),
            name,
            protocols: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map key recording this layer's state.
    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    /// Map key recording which protocol owns a block on this layer.
    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    /// Protocols in registration (evaluation) order.
    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }
}

/// Ordered forwarding pipeline.
#[derive(Debug, Default)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the standard pipeline: health, security, aggregation (LACP).
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_layer(Layer::new(LAYER_HEALTH));
        registry.register_layer(Layer::new(LAYER_SECURITY));

        let aggregation = registry.register_layer(Layer::new(LAYER_AGGREGATION));
        registry.register_protocol(aggregation, PROTOCOL_LACP, LacpEvaluator);

        registry
    }

    /// Appends a layer to the end of the pipeline.
    ///
    /// The previous tail becomes the new layer's predecessor.
    pub fn register_layer(&mut self, layer: Layer) -> LayerId {
        let id = LayerId(self.layers.len());
        debug!(
            layer = %layer.name,
            prev = ?self.layers.last().map(Layer::name),
            "Registering forwarding layer"
        );
        self.layers.push(layer);
        id
    }

    /// Appends a protocol to the end of `layer`'s protocol sequence.
    ///
    /// Returns `None`, registering nothing, if `layer` was not returned by
    /// this registry's [`register_layer`](Self::register_layer).
    pub fn register_protocol(
        &mut self,
        layer: LayerId,
        name: impl Into<String>,
        evaluator: impl ProtocolEvaluator + 'static,
    ) -> Option<&Protocol> {
        let name = name.into();
        let Some(target) = self.layers.get_mut(layer.0) else {
            warn!(protocol = %name, ?layer, "Protocol registered on unknown layer");
            return None;
        };
        let precedence = ProtocolPrecedence::of(&name);

        debug!(
            layer = %target.name,
            protocol = %name,
            ?precedence,
            "Registering protocol"
        );

        target.protocols.push(Protocol {
            name,
            precedence,
            layer,
            evaluator: Box::new(evaluator),
        });
        target.protocols.last()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Returns the layer at `id`.
    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.get(id.0)
    }

    /// Finds a layer by name.
    pub fn find(&self, name: &str) -> Option<LayerId> {
        self.layers.iter().position(|l| l.name == name).map(LayerId)
    }

    /// Returns the layer immediately upstream of `id`.
    pub fn previous(&self, id: LayerId) -> Option<&Layer> {
        id.0.checked_sub(1).and_then(|i| self.layers.get(i))
    }

    /// Returns the last layer of the pipeline.
    pub fn terminal(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Iterates over layers in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().enumerate().map(|(i, l)| (LayerId(i), l))
    }
}
