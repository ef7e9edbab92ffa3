//! Class objects: a layout, its default object and its compiled body.

use std::sync::Arc;

use log::debug;
use ureflect_stream::PackageStream;

use crate::bytecode::Script;
use crate::data_block::PropertyDataBlock;
use crate::error::{Error, PropertyError, Result};
use crate::layout::StructLayout;
use crate::tagged::{LoadReport, read_properties};

/// A class: its layout, its default object and its compiled body.
#[derive(Debug)]
pub struct ClassObject {
    layout: Arc<StructLayout>,
    defaults: PropertyDataBlock,
    script: Option<Script>,
    report: LoadReport,
}

impl ClassObject {
    /// Load a class body from `stream`: `script_size` bytes of decoded
    /// script (none when zero) followed by the tagged default properties.
    ///
    /// The default object starts from `base`'s defaults for inherited
    /// properties. Failures are reported against the class name.
    pub fn load(
        layout: Arc<StructLayout>,
        base: Option<&ClassObject>,
        stream: &mut PackageStream<'_>,
        script_size: usize,
    ) -> Result<Self> {
        let class = layout.name().to_string();
        let wrap = |source: Error| Error::Class {
            class: class.clone(),
            source: Box::new(source),
        };

        let script = if script_size > 0 {
            Some(Script::decode(stream, script_size).map_err(|err| wrap(err.into()))?)
        } else {
            None
        };
        let mut defaults = PropertyDataBlock::new_default(layout.clone(), base.map(|base| &base.defaults))
            .map_err(|err| wrap(err.into()))?;
        let report = read_properties(&mut defaults, stream).map_err(|err| wrap(err.into()))?;
        debug!(
            "loaded class {class}: {} defaults, {} skipped",
            report.loaded,
            report.skipped.len()
        );

        Ok(Self {
            layout,
            defaults,
            script,
            report,
        })
    }

    /// New instance starting out equal to the class defaults.
    pub fn instantiate(&self) -> Result<PropertyDataBlock, PropertyError> {
        PropertyDataBlock::new_instance(&self.defaults)
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    pub fn layout(&self) -> &Arc<StructLayout> {
        &self.layout
    }

    pub fn defaults(&self) -> &PropertyDataBlock {
        &self.defaults
    }

    pub fn defaults_mut(&mut self) -> &mut PropertyDataBlock {
        &mut self.defaults
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    /// What the tagged default stream contained.
    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}
