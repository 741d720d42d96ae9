//! Name-to-constructor registry for aggregators.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aggregators::{
    Aggregator, AggregatorConfig, AverageAggregator, MeanObsAggregator, MinMaxAggregator,
    MissingAggregator, OnMaxSetAggregator, SumAggregator,
};
use crate::error::{BinningError, Result};
use crate::observation::VariableContext;

/// Factory for one aggregator type.
pub trait AggregatorDescriptor: Send + Sync {
    /// Registry name, matched case-insensitively against `AggregatorConfig::kind`.
    fn name(&self) -> &str;

    /// Build an aggregator bound to the channel layout of `ctx`.
    fn create(&self, ctx: &VariableContext, config: &AggregatorConfig) -> Result<Box<dyn Aggregator>>;

    /// Channels the aggregator reads.
    fn source_var_names(&self, config: &AggregatorConfig) -> Vec<String> {
        config.var_name.iter().cloned().collect()
    }
}

/// Adapter turning a constructor function into a descriptor.
struct FnDescriptor<F> {
    name: &'static str,
    create: F,
}

impl<F> AggregatorDescriptor for FnDescriptor<F>
where
    F: Fn(&VariableContext, &AggregatorConfig) -> Result<Box<dyn Aggregator>> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self, ctx: &VariableContext, config: &AggregatorConfig) -> Result<Box<dyn Aggregator>> {
        (self.create)(ctx, config)
    }
}

struct OnMaxSetDescriptor;

impl AggregatorDescriptor for OnMaxSetDescriptor {
    fn name(&self) -> &str {
        OnMaxSetAggregator::NAME
    }

    fn create(&self, ctx: &VariableContext, config: &AggregatorConfig) -> Result<Box<dyn Aggregator>> {
        Ok(Box::new(OnMaxSetAggregator::new(ctx, config)?))
    }

    fn source_var_names(&self, config: &AggregatorConfig) -> Vec<String> {
        config
            .var_name
            .iter()
            .chain(&config.set_var_names)
            .cloned()
            .collect()
    }
}

/// Registry of known aggregator types.
///
/// Lookups happen once while building the [`BinManager`](crate::BinManager);
/// the hot path only sees the resulting trait objects.
#[derive(Clone)]
pub struct AggregatorRegistry {
    descriptors: BTreeMap<String, Arc<dyn AggregatorDescriptor>>,
}

impl AggregatorRegistry {
    /// Empty registry.
    pub fn empty() -> Self {
        Self {
            descriptors: BTreeMap::new(),
        }
    }

    /// Registry with all built-in aggregators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(FnDescriptor {
            name: AverageAggregator::NAME,
            create: |ctx: &VariableContext, cfg: &AggregatorConfig| -> Result<Box<dyn Aggregator>> {
                Ok(Box::new(AverageAggregator::new(ctx, cfg)?))
            },
        }));
        registry.register(Arc::new(FnDescriptor {
            name: MeanObsAggregator::NAME,
            create: |ctx: &VariableContext, cfg: &AggregatorConfig| -> Result<Box<dyn Aggregator>> {
                Ok(Box::new(MeanObsAggregator::new(ctx, cfg)?))
            },
        }));
        registry.register(Arc::new(FnDescriptor {
            name: MinMaxAggregator::NAME,
            create: |ctx: &VariableContext, cfg: &AggregatorConfig| -> Result<Box<dyn Aggregator>> {
                Ok(Box::new(MinMaxAggregator::new(ctx, cfg)?))
            },
        }));
        registry.register(Arc::new(FnDescriptor {
            name: SumAggregator::NAME,
            create: |ctx: &VariableContext, cfg: &AggregatorConfig| -> Result<Box<dyn Aggregator>> {
                Ok(Box::new(SumAggregator::new(ctx, cfg)?))
            },
        }));
        registry.register(Arc::new(FnDescriptor {
            name: MissingAggregator::NAME,
            create: |ctx: &VariableContext, cfg: &AggregatorConfig| -> Result<Box<dyn Aggregator>> {
                Ok(Box::new(MissingAggregator::new(ctx, cfg)?))
            },
        }));
        registry.register(Arc::new(OnMaxSetDescriptor));
        registry
    }

    /// Add or replace a descriptor.
    pub fn register(&mut self, descriptor: Arc<dyn AggregatorDescriptor>) {
        self.descriptors
            .insert(descriptor.name().to_ascii_uppercase(), descriptor);
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AggregatorDescriptor>> {
        self.descriptors.get(&name.to_ascii_uppercase())
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.descriptors.values().map(|d| d.name()).collect()
    }

    /// Resolve and build the aggregator described by `config`.
    pub fn create(&self, ctx: &VariableContext, config: &AggregatorConfig) -> Result<Box<dyn Aggregator>> {
        let descriptor = self.get(&config.kind).ok_or_else(|| {
            BinningError::configuration(format!(
                "unknown aggregator '{}' (known: {})",
                config.kind,
                self.names().join(", ")
            ))
        })?;
        descriptor.create(ctx, config)
    }
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for AggregatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregatorRegistry")
            .field("names", &self.names())
            .finish()
    }
}
