// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Demosaic: the only format transition in the chain, 1-channel CFA in,
//! 4-channel RGB out. Method dispatch depends on the sensor, the requested
//! scale and the user's choice; everything at or below half size takes the
//! fast quad-average path.

mod green_eq;
mod ppg;
mod smooth;

use num_traits::FromPrimitive;

use crate::buffer::BufferDesc;
use crate::colorspace::ColorSpace;
use crate::error::Result;
use crate::image::{ImageRecord, filter_color};
use crate::ops::{OpFlags, Operation, Piece};
use crate::params::{self, ParamDesc};
use crate::render::clip_zoom::{clip_and_zoom, copy_rows_clamped};
use crate::render::tiling::TilingSpec;
use crate::roi::{Roi, cfa_alignment, snap_to_cfa};
use crate::util::parallel;
use crate::util::tracing_wrappers::*;

pub struct Demosaic;

#[derive(Clone, Copy, Debug, PartialEq, Eq, num_derive::FromPrimitive)]
pub enum DemosaicMethod {
    Ppg = 0,
    PassthroughMonochrome = 1,
    PassthroughColor = 2,
}

impl DemosaicMethod {
    pub fn is_passthrough(self) -> bool {
        matches!(
            self,
            DemosaicMethod::PassthroughMonochrome | DemosaicMethod::PassthroughColor
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, num_derive::FromPrimitive)]
enum GreenEqMode {
    Off = 0,
    Local = 1,
    Full = 2,
    Both = 3,
}

const TABLE: &[ParamDesc] = &[
    ParamDesc::u32("method", 0, 0.0, 2.0),
    ParamDesc::f32("median_threshold", 4, 0.0, 1.0),
    ParamDesc::u32("green_eq", 8, 0.0, 3.0),
    ParamDesc::u32("color_smoothing", 12, 0.0, 5.0),
];

struct Data {
    method: DemosaicMethod,
    median_threshold: f32,
    green_eq: GreenEqMode,
    smoothing_passes: usize,
}

fn data(piece: &Piece) -> &Data {
    piece.data().expect("demosaic params not committed")
}

impl Operation for Demosaic {
    fn name(&self) -> &'static str {
        "demosaic"
    }

    fn flags(&self) -> OpFlags {
        OpFlags {
            allow_tiling: true,
            one_instance: true,
            ..OpFlags::default()
        }
    }

    fn param_table(&self) -> &'static [ParamDesc] {
        TABLE
    }

    fn default_params(&self, _image: &ImageRecord) -> Vec<u8> {
        params::new_record(TABLE)
    }

    fn default_enabled(&self, image: &ImageRecord) -> bool {
        image.is_raw()
    }

    fn commit_params(&self, record: &[u8], image: &ImageRecord, piece: &mut Piece) -> Result<()> {
        if !image.is_raw() {
            piece.enabled = false;
            return Ok(());
        }
        let raw_method = params::find(TABLE, "method")
            .expect("static table")
            .read_i32(record)?;
        let mut method = DemosaicMethod::from_i32(raw_method).unwrap_or_else(|| {
            warn!("unknown demosaic method {}, using ppg", raw_method);
            DemosaicMethod::Ppg
        });
        if image.is_monochrome() || (image.filters() == 0 && !method.is_passthrough()) {
            method = DemosaicMethod::PassthroughMonochrome;
        } else if image.filters() == crate::image::FILTERS_XTRANS
            && method == DemosaicMethod::Ppg
        {
            warn!("ppg does not support x-trans sensors, falling back to passthrough color");
            method = DemosaicMethod::PassthroughColor;
        }
        let raw_green_eq = params::find(TABLE, "green_eq")
            .expect("static table")
            .read_i32(record)?;
        piece.set_data(Data {
            method,
            median_threshold: params::find(TABLE, "median_threshold")
                .expect("static table")
                .read_f32(record)?,
            green_eq: GreenEqMode::from_i32(raw_green_eq).unwrap_or(GreenEqMode::Off),
            smoothing_passes: params::find(TABLE, "color_smoothing")
                .expect("static table")
                .read_i32(record)?
                .clamp(0, 5) as usize,
        });
        Ok(())
    }

    fn modify_roi_in(&self, piece: &Piece, roi_out: &Roi) -> Roi {
        let s = roi_out.scale;
        // Enough support for the interpolation border plus bilinear lookup,
        // so an interior region render matches the full-frame result.
        const MARGIN: i32 = 5;
        let x0 = (roi_out.x as f32 / s).floor() as i32 - MARGIN;
        let y0 = (roi_out.y as f32 / s).floor() as i32 - MARGIN;
        let x1 = ((roi_out.x + roi_out.width as i32) as f32 / s).ceil() as i32 + MARGIN;
        let y1 = ((roi_out.y + roi_out.height as i32) as f32 / s).ceil() as i32 + MARGIN;
        let raw = Roi {
            x: x0.max(0),
            y: y0.max(0),
            width: (x1 - x0.max(0)).max(1) as usize,
            height: (y1 - y0.max(0)).max(1) as usize,
            scale: 1.0,
        };
        snap_to_cfa(&raw, piece.dsc_in.filters, piece.full_in.0, piece.full_in.1)
    }

    fn output_format(&self, _piece: &mut Piece, _image: &ImageRecord, dsc: &mut BufferDesc) {
        dsc.channels = 4;
        dsc.cst = ColorSpace::Rgb;
        dsc.filters = 0;
        for k in 0..4 {
            dsc.processed_maximum[k] = dsc.processed_maximum[k].max(1.0);
        }
    }

    fn tiling(&self, piece: &Piece, _roi_in: &Roi, _roi_out: &Roi) -> TilingSpec {
        TilingSpec {
            factor: 3.0,
            overhead: 0,
            overlap: 5,
            align: cfa_alignment(piece.dsc_in.filters) as usize,
        }
    }

    fn process(
        &self,
        piece: &mut Piece,
        input: &[f32],
        output: &mut [f32],
        roi_in: &Roi,
        roi_out: &Roi,
    ) -> Result<()> {
        let d = data(piece);
        let filters = piece.dsc_in.filters;
        let xtrans = piece.dsc_in.xtrans;
        let (w, h) = (roi_in.width, roi_in.height);
        let (ox, oy) = (roi_in.x as i64, roi_in.y as i64);
        let fullscale = roi_out.scale > 0.5;
        let bayer = piece.dsc_in.is_mosaic() && !piece.dsc_in.is_xtrans();

        let mut method = d.method;
        if (roi_out.width < 16 || roi_out.height < 16) && !method.is_passthrough() {
            method = DemosaicMethod::Ppg;
        }

        // Mosaic preprocessing applies to the CFA data itself.
        let mut work: Option<Vec<f32>> = None;
        if bayer && method == DemosaicMethod::Ppg {
            if d.green_eq != GreenEqMode::Off {
                let mut buf = input.to_vec();
                let maximum = piece.dsc_in.processed_maximum[1].max(1.0);
                if matches!(d.green_eq, GreenEqMode::Full | GreenEqMode::Both) {
                    green_eq::full_average(&mut buf, w, h, ox, oy, filters);
                }
                if matches!(d.green_eq, GreenEqMode::Local | GreenEqMode::Both) {
                    green_eq::local_average(&mut buf, w, h, ox, oy, filters, maximum);
                }
                work = Some(buf);
            }
            if d.median_threshold > 0.0 {
                let src = work.as_deref().unwrap_or(input);
                let mut buf = vec![0f32; w * h];
                ppg::pre_median(&mut buf, src, w, h, d.median_threshold);
                work = Some(buf);
            }
        }
        let mosaic = work.as_deref().unwrap_or(input);

        if !fullscale && bayer && method == DemosaicMethod::Ppg {
            // Half-size path: every 2x2 quad averages straight into one RGB
            // pixel, then a bilinear zoom covers the remaining ratio.
            let (hw, hh) = ((w / 2).max(1), (h / 2).max(1));
            let mut half = vec![0f32; hw * hh * 4];
            half_size(&mut half, mosaic, w, hw, ox, oy, filters);
            if d.smoothing_passes > 0 {
                smooth::color_smoothing(&mut half, hw, hh, d.smoothing_passes);
            }
            let roi_half = Roi {
                x: roi_in.x / 2,
                y: roi_in.y / 2,
                width: hw,
                height: hh,
                scale: 0.5,
            };
            clip_and_zoom(output, &half, roi_out, &roi_half, 4);
            return Ok(());
        }

        let mut full = vec![0f32; w * h * 4];
        match method {
            DemosaicMethod::Ppg => ppg::demosaic_ppg(&mut full, mosaic, w, h, ox, oy, filters),
            DemosaicMethod::PassthroughMonochrome => {
                parallel::for_each_row(&mut full, w * 4, |j, row| {
                    let src = &mosaic[j * w..(j + 1) * w];
                    for (px, &v) in row.chunks_mut(4).zip(src.iter()) {
                        px[0] = v;
                        px[1] = v;
                        px[2] = v;
                        px[3] = 0.0;
                    }
                });
            }
            DemosaicMethod::PassthroughColor => {
                parallel::for_each_row(&mut full, w * 4, |j, row| {
                    let src = &mosaic[j * w..(j + 1) * w];
                    for (i, (px, &v)) in row.chunks_mut(4).zip(src.iter()).enumerate() {
                        px.fill(0.0);
                        let c = ppg::chan(filter_color(
                            filters,
                            &xtrans,
                            oy + j as i64,
                            ox + i as i64,
                        ));
                        px[c] = v;
                    }
                });
            }
        }
        if d.smoothing_passes > 0 {
            smooth::color_smoothing(&mut full, w, h, d.smoothing_passes);
        }

        if roi_out.scale == 1.0 {
            let local = Roi {
                x: roi_out.x - roi_in.x,
                y: roi_out.y - roi_in.y,
                width: roi_out.width,
                height: roi_out.height,
                scale: 1.0,
            };
            copy_rows_clamped(output, &local, &full, w, h, 4);
        } else {
            clip_and_zoom(output, &full, roi_out, roi_in, 4);
        }
        Ok(())
    }
}

fn half_size(half: &mut [f32], mosaic: &[f32], w: usize, hw: usize, ox: i64, oy: i64, filters: u32) {
    let xtrans = [[0u8; 6]; 6];
    parallel::for_each_row(half, hw * 4, |j, row| {
        for (i, px) in row.chunks_mut(4).enumerate() {
            let mut rgb = [0f32; 3];
            let mut green_sum = 0f32;
            let mut green_cnt = 0u32;
            for dj in 0..2usize {
                for di in 0..2usize {
                    let (jj, ii) = (j * 2 + dj, i * 2 + di);
                    let v = mosaic[jj * w + ii];
                    let c = ppg::chan(filter_color(
                        filters,
                        &xtrans,
                        oy + jj as i64,
                        ox + ii as i64,
                    ));
                    if c == 1 {
                        green_sum += v;
                        green_cnt += 1;
                    } else {
                        rgb[c] = v;
                    }
                }
            }
            px[0] = rgb[0];
            px[1] = if green_cnt > 0 {
                green_sum / green_cnt as f32
            } else {
                0.0
            };
            px[2] = rgb[2];
            px[3] = 0.0;
        }
    });
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::{FILTERS_RGGB, ImageParams, ImageRecord};

    fn bayer_image(w: usize, h: usize, value: f32) -> std::sync::Arc<ImageRecord> {
        ImageRecord::new(ImageParams {
            width: w,
            height: h,
            raw: vec![value; w * h],
            filters: FILTERS_RGGB,
            ..Default::default()
        })
        .unwrap()
    }

    fn committed_piece(image: &ImageRecord) -> Piece {
        let op = Demosaic;
        let record = op.default_params(image);
        let mut piece = Piece::new(0);
        piece.dsc_in = crate::buffer::BufferDesc::for_input(image);
        piece.full_in = (image.width(), image.height());
        piece.full_out = piece.full_in;
        op.commit_params(&record, image, &mut piece).unwrap();
        piece
    }

    #[test]
    fn roi_in_snaps_to_bayer_grid() {
        let image = bayer_image(64, 64, 0.5);
        let piece = committed_piece(&image);
        let roi_out = Roi::new(13, 27, 20, 20, 1.0);
        let roi_in = Demosaic.modify_roi_in(&piece, &roi_out);
        assert_eq!(roi_in.x % 2, 0);
        assert_eq!(roi_in.y % 2, 0);
        assert_eq!(roi_in.scale, 1.0);
        assert!(roi_in.x <= roi_out.x && roi_in.y <= roi_out.y);
    }

    #[test]
    fn output_format_declares_rgba() {
        let image = bayer_image(32, 32, 0.5);
        let mut piece = committed_piece(&image);
        let mut dsc = piece.dsc_in;
        Demosaic.output_format(&mut piece, &image, &mut dsc);
        assert_eq!(dsc.channels, 4);
        assert_eq!(dsc.cst, ColorSpace::Rgb);
        assert_eq!(dsc.filters, 0);
        assert!(dsc.processed_maximum.iter().all(|&m| m >= 1.0));
    }

    #[test]
    fn flat_full_scale_render_is_flat() {
        let image = bayer_image(32, 32, 0.5);
        let mut piece = committed_piece(&image);
        let roi_out = Roi::full(32, 32);
        let roi_in = Demosaic.modify_roi_in(&piece, &roi_out);
        let mut out = vec![0f32; roi_out.pixels() * 4];
        let input = image.raw();
        Demosaic
            .process(&mut piece, input, &mut out, &roi_in, &roi_out)
            .unwrap();
        for px in out.chunks(4) {
            for c in 0..3 {
                assert!((px[c] - 0.5).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn half_scale_takes_quad_average() {
        let image = bayer_image(32, 32, 0.8);
        let mut piece = committed_piece(&image);
        let roi_out = Roi::new(0, 0, 16, 16, 0.5);
        let roi_in = Demosaic.modify_roi_in(&piece, &roi_out);
        let mut out = vec![0f32; roi_out.pixels() * 4];
        let input = &image.raw()[(roi_in.y as usize * 32 + roi_in.x as usize)..];
        // roi_in starts at the origin for this request.
        assert_eq!((roi_in.x, roi_in.y), (0, 0));
        let input = &input[..roi_in.pixels()];
        Demosaic
            .process(&mut piece, input, &mut out, &roi_in, &roi_out)
            .unwrap();
        for px in out.chunks(4) {
            for c in 0..3 {
                assert!((px[c] - 0.8).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn monochrome_sensor_expands_to_gray() {
        let image = ImageRecord::new(ImageParams {
            width: 16,
            height: 16,
            raw: vec![0.3; 256],
            filters: 0,
            monochrome: true,
            ..Default::default()
        })
        .unwrap();
        let mut piece = committed_piece(&image);
        assert_eq!(data(&piece).method, DemosaicMethod::PassthroughMonochrome);
        let roi = Roi::full(16, 16);
        let mut out = vec![0f32; 256 * 4];
        Demosaic
            .process(&mut piece, image.raw(), &mut out, &roi, &roi)
            .unwrap();
        for px in out.chunks(4) {
            assert_eq!(&px[..3], &[0.3, 0.3, 0.3]);
            assert_eq!(px[3], 0.0);
        }
    }
}
