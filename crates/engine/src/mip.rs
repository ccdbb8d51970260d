// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Message interchange protocol (MIP) version negotiation.
//!
//! Each component class reports the MIP versions it supports for given
//! parameters. A graph can only use a version every one of its classes
//! supports; the greatest such version is the operative one.

use crate::constants::MAX_MIP_VERSION;
use serde_json::Value;
use std::sync::Arc;
use tracegraph_core::component::LoggingLevel;
use tracegraph_core::component_class::ComponentClass;
use tracegraph_core::error::{ErrorContext, Result};
use tracegraph_core::integer_range::UnsignedIntegerRangeSet;
use tracegraph_core::{ensure_post, ensure_pre};

/// A component class with the parameters it would be instantiated with.
#[derive(Debug, Clone)]
pub struct ComponentDescriptor {
    pub class: Arc<ComponentClass>,
    pub params: Option<Value>,
    pub logging_level: LoggingLevel,
}

#[derive(Debug, Clone, Default)]
pub struct ComponentDescriptorSet {
    descriptors: Vec<ComponentDescriptor>,
}

impl ComponentDescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_descriptor(
        &mut self,
        class: Arc<ComponentClass>,
        params: Option<Value>,
        logging_level: LoggingLevel,
    ) {
        self.descriptors.push(ComponentDescriptor { class, params, logging_level });
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComponentDescriptor> {
        self.descriptors.iter()
    }
}

fn supported_versions(descriptor: &ComponentDescriptor) -> Result<UnsignedIntegerRangeSet> {
    let class = &descriptor.class;
    let mut versions = UnsignedIntegerRangeSet::new();
    let Some(method) = class.get_supported_mip_versions_method() else {
        versions.add_range(0, 0)?;
        return Ok(versions);
    };
    method(descriptor.params.as_ref(), descriptor.logging_level, &mut versions)
        .cause(format!("Cannot get supported MIP versions of `{}`", class.name()))?;
    ensure_post!(
        !versions.is_empty(),
        "supported-versions-not-empty",
        "Component class `{}` reported no supported MIP version",
        class.name()
    );
    Ok(versions)
}

/// Returns the greatest MIP version every descriptor supports, or `None` if
/// they have no version in common.
///
/// # Errors
///
/// Fails if the set is empty or if a class's method fails.
pub fn greatest_operative_mip_version(descriptors: &ComponentDescriptorSet) -> Result<Option<u64>> {
    ensure_pre!(
        !descriptors.is_empty(),
        "descriptor-set-is-not-empty",
        "Component descriptor set is empty"
    );

    let mut common = UnsignedIntegerRangeSet::new();
    common.add_range(0, MAX_MIP_VERSION)?;
    for descriptor in descriptors.iter() {
        let versions = supported_versions(descriptor)?;
        tracing::trace!(
            class = %descriptor.class.name(),
            ranges = versions.len(),
            "Supported MIP versions"
        );
        common = common.intersection(&versions);
        if common.is_empty() {
            tracing::info!(class = %descriptor.class.name(), "No common MIP version");
            return Ok(None);
        }
    }
    let version = common.max_value();
    tracing::debug!(?version, "Negotiated MIP version");
    Ok(version)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tracegraph_core::component_class::ConsumeStatus;

    fn sink_supporting(lower: u64, upper: u64) -> Arc<ComponentClass> {
        let mut class = ComponentClass::sink("s", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap();
        class.set_get_supported_mip_versions_method(Arc::new(move |_, _, versions| {
            versions.add_range(lower, upper)
        }));
        Arc::new(class)
    }

    fn plain_sink() -> Arc<ComponentClass> {
        Arc::new(ComponentClass::sink("plain", Arc::new(|_| Ok(ConsumeStatus::End))).unwrap())
    }

    #[test]
    fn greatest_common_version_wins() {
        let mut set = ComponentDescriptorSet::new();
        set.add_descriptor(sink_supporting(0, 5), None, LoggingLevel::Info);
        set.add_descriptor(sink_supporting(1, 1), None, LoggingLevel::Info);
        assert_eq!(greatest_operative_mip_version(&set).unwrap(), Some(1));
    }

    #[test]
    fn classes_without_method_support_version_zero() {
        let mut set = ComponentDescriptorSet::new();
        set.add_descriptor(plain_sink(), None, LoggingLevel::Info);
        set.add_descriptor(sink_supporting(0, 1), None, LoggingLevel::Info);
        assert_eq!(greatest_operative_mip_version(&set).unwrap(), Some(0));

        set.add_descriptor(sink_supporting(1, 1), None, LoggingLevel::Info);
        assert_eq!(greatest_operative_mip_version(&set).unwrap(), None);
    }

    #[test]
    fn versions_above_maximum_are_ignored() {
        let mut set = ComponentDescriptorSet::new();
        set.add_descriptor(sink_supporting(7, 9), None, LoggingLevel::Info);
        assert_eq!(greatest_operative_mip_version(&set).unwrap(), None);
    }

    #[test]
    fn empty_set_is_rejected() {
        let err = greatest_operative_mip_version(&ComponentDescriptorSet::new()).unwrap_err();
        assert_eq!(err.precondition().map(|v| v.id), Some("descriptor-set-is-not-empty"));
    }
}
