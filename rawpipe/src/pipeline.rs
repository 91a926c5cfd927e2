// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The pipeline: an ordered list of module instances bound to one image.
//! Mutable exclusively through `&mut self`, which is what serializes render
//! calls; cancellation crosses threads through a cloned [`CancelHandle`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::blend::BlendParams;
use crate::buffer::{AlignedBuf, BufferDesc};
use crate::error::{Error, Result};
use crate::image::ImageRecord;
use crate::ops::{self, Operation, Piece};
use crate::order::{self, OrderEntry, OrderKind, OrderList};
use crate::params;
use crate::util::tracing_wrappers::*;

pub struct ModuleInstance {
    pub(crate) op: &'static dyn Operation,
    pub(crate) params: Vec<u8>,
    pub(crate) defaults: Vec<u8>,
    pub(crate) enabled: bool,
    pub(crate) instance: i32,
    pub(crate) iop_order: i32,
    pub(crate) blend: Option<BlendParams>,
}

impl ModuleInstance {
    pub fn name(&self) -> &'static str {
        self.op.name()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn instance(&self) -> i32 {
        self.instance
    }

    pub fn iop_order(&self) -> i32 {
        self.iop_order
    }

    pub fn version(&self) -> i32 {
        self.op.version()
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }
}

pub(crate) struct BackBuffer {
    pub(crate) data: AlignedBuf,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

/// Values an external thread can post to stop a render between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopSignal {
    Nodes = 1,
    Hq = 2,
}

#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicI32>);

impl CancelHandle {
    pub fn stop(&self, signal: StopSignal) {
        self.0.store(signal as i32, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst) != 0
    }
}

pub struct Pipeline {
    pub(crate) image: Arc<ImageRecord>,
    pub(crate) modules: Vec<ModuleInstance>,
    pub(crate) order_kind: OrderKind,
    pub(crate) mask_display: bool,
    pub(crate) shutdown: Arc<AtomicI32>,
    pub(crate) pieces: Vec<Piece>,
    pub(crate) backbuf: Option<BackBuffer>,
    pub(crate) last_dsc: BufferDesc,
}

impl Pipeline {
    /// Builds a pipeline with the default ordering for the image kind.
    pub fn new(image: Arc<ImageRecord>) -> Result<Pipeline> {
        let kind = if image.is_raw() {
            OrderKind::V30Raw
        } else {
            OrderKind::V30Jpeg
        };
        Pipeline::with_order(image, kind)
    }

    pub fn with_order(image: Arc<ImageRecord>, kind: OrderKind) -> Result<Pipeline> {
        Pipeline::from_list(image, kind, order::list_for(kind))
    }

    pub fn with_custom_order(image: Arc<ImageRecord>, list: OrderList) -> Result<Pipeline> {
        order::validate(&list)?;
        Pipeline::from_list(image, OrderKind::Custom, list)
    }

    fn from_list(image: Arc<ImageRecord>, kind: OrderKind, list: OrderList) -> Result<Pipeline> {
        let mut modules = Vec::with_capacity(list.len());
        for entry in &list {
            let Some(op) = ops::lookup(&entry.op) else {
                warn!("order list names unknown operation {:?}, skipping", entry.op);
                continue;
            };
            let defaults = op.default_params(&image);
            debug_assert_eq!(defaults.len(), params::record_size(op.param_table()));
            modules.push(ModuleInstance {
                op,
                params: defaults.clone(),
                defaults,
                enabled: op.default_enabled(&image),
                instance: entry.instance,
                iop_order: entry.order,
                blend: None,
            });
        }
        let mut pipeline = Pipeline {
            image,
            modules,
            order_kind: kind,
            mask_display: false,
            shutdown: Arc::new(AtomicI32::new(0)),
            pieces: Vec::new(),
            backbuf: None,
            last_dsc: BufferDesc::seed(),
        };
        pipeline.sort_modules();
        Ok(pipeline)
    }

    pub(crate) fn sort_modules(&mut self) {
        self.modules
            .sort_by(|a, b| (a.iop_order, a.instance).cmp(&(b.iop_order, b.instance)));
    }

    pub fn image(&self) -> &Arc<ImageRecord> {
        &self.image
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn module(&self, index: usize) -> Option<&ModuleInstance> {
        self.modules.get(index)
    }

    pub fn order_kind(&self) -> OrderKind {
        self.order_kind
    }

    pub fn order_list(&self) -> OrderList {
        self.modules
            .iter()
            .map(|m| OrderEntry {
                op: m.op.name().to_string(),
                instance: m.instance,
                order: m.iop_order,
            })
            .collect()
    }

    /// Re-keys module order from a new list; entries are matched by
    /// (operation, instance) and the list is re-sorted. Invalidates any
    /// cached render.
    pub fn apply_order(&mut self, kind: OrderKind, list: &[OrderEntry]) {
        for module in self.modules.iter_mut() {
            if let Some(entry) = list
                .iter()
                .find(|e| e.op == module.op.name() && e.instance == module.instance)
            {
                module.iop_order = entry.order;
            }
        }
        self.order_kind = kind;
        self.sort_modules();
        self.invalidate();
    }

    pub(crate) fn find_module(&self, op: &str, instance: i32) -> Option<usize> {
        self.modules
            .iter()
            .position(|m| m.op.name() == op && m.instance == instance)
    }

    fn module_mut(&mut self, op: &str) -> Result<&mut ModuleInstance> {
        let index = self
            .find_module(op, 0)
            .ok_or_else(|| Error::UnknownOperation(op.into()))?;
        Ok(&mut self.modules[index])
    }

    pub fn set_enabled(&mut self, op: &str, enabled: bool) -> Result<()> {
        let module = self.module_mut(op)?;
        if module.op.flags().deprecated && enabled {
            warn!("enabling deprecated module {}", op);
        }
        module.enabled = enabled;
        self.invalidate();
        Ok(())
    }

    pub fn is_enabled(&self, op: &str) -> Result<bool> {
        let index = self
            .find_module(op, 0)
            .ok_or_else(|| Error::UnknownOperation(op.into()))?;
        Ok(self.modules[index].enabled)
    }

    pub fn set_param_f32(&mut self, op: &str, field: &str, value: f32) -> Result<()> {
        let desc = *params::lookup(op, field)?;
        if !desc.in_soft_range(value as f64) {
            warn!(
                "{}.{} = {} is outside the advisory range [{}, {}]",
                op, field, value, desc.soft_min, desc.soft_max
            );
        }
        let module = self.module_mut(op)?;
        desc.write_f32(&mut module.params, value)?;
        self.invalidate();
        Ok(())
    }

    pub fn get_param_f32(&self, op: &str, field: &str) -> Result<f32> {
        let desc = params::lookup(op, field)?;
        let index = self
            .find_module(op, 0)
            .ok_or_else(|| Error::UnknownOperation(op.into()))?;
        desc.read_f32(&self.modules[index].params)
    }

    pub fn set_param_i32(&mut self, op: &str, field: &str, value: i32) -> Result<()> {
        let desc = *params::lookup(op, field)?;
        if !desc.in_soft_range(value as f64) {
            warn!(
                "{}.{} = {} is outside the advisory range [{}, {}]",
                op, field, value, desc.soft_min, desc.soft_max
            );
        }
        let module = self.module_mut(op)?;
        desc.write_i32(&mut module.params, value)?;
        self.invalidate();
        Ok(())
    }

    pub fn get_param_i32(&self, op: &str, field: &str) -> Result<i32> {
        let desc = params::lookup(op, field)?;
        let index = self
            .find_module(op, 0)
            .ok_or_else(|| Error::UnknownOperation(op.into()))?;
        desc.read_i32(&self.modules[index].params)
    }

    /// Drops any cached render result.
    pub(crate) fn invalidate(&mut self) {
        self.backbuf = None;
    }

    /// Mask-display mode: non-distorting modules become transparent so a
    /// caller can inspect mask data flowing through the chain.
    pub fn set_mask_display(&mut self, on: bool) {
        self.mask_display = on;
        self.invalidate();
    }

    pub fn mask_display(&self) -> bool {
        self.mask_display
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.shutdown.clone())
    }

    pub(crate) fn reset_shutdown(&self) {
        self.shutdown.store(0, Ordering::SeqCst);
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst) != 0
    }

    /// The final float RGBA of the last successful render, if any.
    pub fn backbuffer(&self) -> Option<(&[f32], usize, usize)> {
        self.backbuf
            .as_ref()
            .map(|b| (b.data.as_slice(), b.width, b.height))
    }

    /// Descriptor of the buffer the last render produced.
    pub fn output_descriptor(&self) -> &BufferDesc {
        &self.last_dsc
    }

    /// Restores a module's parameters to their image defaults.
    pub fn reset_module(&mut self, op: &str) -> Result<()> {
        let module = self.module_mut(op)?;
        let defaults = module.defaults.clone();
        module.params.copy_from_slice(&defaults);
        self.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams};

    pub fn bayer_image(w: usize, h: usize) -> Arc<ImageRecord> {
        ImageRecord::new(ImageParams {
            width: w,
            height: h,
            raw: vec![0.5; w * h],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn default_pipeline_brackets_the_chain() {
        let pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        assert_eq!(pipe.module(0).unwrap().name(), "rawprepare");
        assert_eq!(
            pipe.module(pipe.module_count() - 1).unwrap().name(),
            "gamma"
        );
        assert_eq!(pipe.order_kind(), OrderKind::V30Raw);
    }

    #[test]
    fn modules_are_sorted_by_order_key() {
        let pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        for pair in pipe.modules.windows(2) {
            assert!(
                (pair[0].iop_order, pair[0].instance) <= (pair[1].iop_order, pair[1].instance)
            );
        }
    }

    #[test]
    fn param_round_trip_is_bit_exact() {
        let mut pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        pipe.set_param_f32("exposure", "exposure", 1.5).unwrap();
        assert_eq!(
            pipe.get_param_f32("exposure", "exposure").unwrap().to_bits(),
            1.5f32.to_bits()
        );
    }

    #[test]
    fn unknown_lookups_report_not_found() {
        let mut pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        assert!(matches!(
            pipe.set_param_f32("nonexistent", "x", 0.0),
            Err(Error::UnknownOperation(_))
        ));
        assert!(matches!(
            pipe.set_param_f32("exposure", "nonexistent", 0.0),
            Err(Error::UnknownField(..))
        ));
        assert!(matches!(
            pipe.set_param_f32("exposure", "compensate_bias", 0.0),
            Err(Error::ParamType { .. })
        ));
    }

    #[test]
    fn out_of_soft_range_is_accepted() {
        let mut pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        pipe.set_param_f32("exposure", "exposure", 25.0).unwrap();
        assert_eq!(pipe.get_param_f32("exposure", "exposure").unwrap(), 25.0);
    }

    #[test]
    fn enable_toggles_and_reports() {
        let mut pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        assert!(!pipe.is_enabled("sharpen").unwrap());
        pipe.set_enabled("sharpen", true).unwrap();
        assert!(pipe.is_enabled("sharpen").unwrap());
        assert!(pipe.set_enabled("nonexistent", true).is_err());
    }

    #[test]
    fn reset_module_restores_defaults() {
        let mut pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        let default = pipe.get_param_f32("sharpen", "radius").unwrap();
        pipe.set_param_f32("sharpen", "radius", 7.0).unwrap();
        pipe.reset_module("sharpen").unwrap();
        assert_eq!(pipe.get_param_f32("sharpen", "radius").unwrap(), default);
    }

    #[test]
    fn cancel_handle_crosses_threads() {
        let pipe = Pipeline::new(bayer_image(16, 16)).unwrap();
        let handle = pipe.cancel_handle();
        std::thread::spawn(move || handle.stop(StopSignal::Nodes))
            .join()
            .unwrap();
        assert!(pipe.is_shutdown());
    }

    #[test]
    fn custom_order_is_validated() {
        let mut list = order::list_for(OrderKind::V30Raw);
        let a = list.iter().position(|e| e.op == "colorin").unwrap();
        let b = list.iter().position(|e| e.op == "colorout").unwrap();
        list.swap(a, b);
        // Orders still ascending by position swap? Re-key to entry position
        // so the sequence is what is validated.
        for (i, e) in list.iter_mut().enumerate() {
            e.order = order::FIRST_ORDER + i as i32 * order::ORDER_STRIDE;
        }
        assert!(Pipeline::with_custom_order(bayer_image(16, 16), list).is_err());
    }
}
