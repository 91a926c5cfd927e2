// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Raw file decoding: rawloader output reshaped into the engine's immutable
//! image record. The sensor data is kept in native levels; normalization is
//! rawprepare's job.

use std::path::Path;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr, eyre};
use rawpipe::image::{FILTERS_XTRANS, ImageParams, ImageRecord, Orientation};

/// Packs a 2x2 CFA pattern into the dcraw-style filter mask the engine
/// uses. Each (row, col) cell contributes two bits at the position
/// `filter_color` reads them from.
fn pack_filters(color_at: impl Fn(usize, usize) -> usize) -> u32 {
    let mut filters = 0u32;
    for row in 0..8 {
        for col in 0..2 {
            let shift = ((((row << 1) & 14) | (col & 1)) << 1) as u32;
            filters |= (color_at(row, col) as u32 & 3) << shift;
        }
    }
    filters
}

fn convert_orientation(orientation: rawloader::Orientation) -> Orientation {
    match orientation {
        rawloader::Orientation::Normal | rawloader::Orientation::Unknown => Orientation::Normal,
        rawloader::Orientation::HorizontalFlip => Orientation::MirrorHorizontal,
        rawloader::Orientation::Rotate180 => Orientation::Rotate180,
        rawloader::Orientation::VerticalFlip => Orientation::MirrorVertical,
        rawloader::Orientation::Transpose => Orientation::Transpose,
        rawloader::Orientation::Rotate90 => Orientation::Rotate90,
        rawloader::Orientation::Transverse => Orientation::Transverse,
        rawloader::Orientation::Rotate270 => Orientation::Rotate270,
    }
}

/// Decodes a raw file into an [`ImageRecord`].
pub fn load_raw(path: &Path) -> Result<Arc<ImageRecord>> {
    let raw = rawloader::decode_file(path)
        .map_err(|e| eyre!(e.to_string()))
        .wrap_err_with(|| format!("Failed to decode {:?}", path))?;

    if raw.cpp != 1 {
        return Err(eyre!(
            "{:?}: {} components per pixel, only CFA sensors are supported",
            path,
            raw.cpp
        ));
    }

    let data: Vec<f32> = match raw.data {
        rawloader::RawImageData::Integer(ref v) => v.iter().map(|&s| s as f32).collect(),
        rawloader::RawImageData::Float(ref v) => v.clone(),
    };

    let is_xtrans = raw.cfa.width == 6;
    let mut xtrans = [[0u8; 6]; 6];
    if is_xtrans {
        for (row, line) in xtrans.iter_mut().enumerate() {
            for (col, cell) in line.iter_mut().enumerate() {
                *cell = raw.cfa.color_at(row, col) as u8;
            }
        }
    }
    let filters = if is_xtrans {
        FILTERS_XTRANS
    } else if raw.cfa.width == 0 {
        // Monochrome sensor, no mosaic.
        0
    } else {
        pack_filters(|row, col| raw.cfa.color_at(row, col))
    };

    // rawloader crops are top, right, bottom, left.
    let (top, right, bottom, left) = (raw.crops[0], raw.crops[1], raw.crops[2], raw.crops[3]);

    let image = ImageRecord::new(ImageParams {
        width: raw.width,
        height: raw.height,
        crop_x: left,
        crop_y: top,
        crop_width: raw.width.saturating_sub(left + right),
        crop_height: raw.height.saturating_sub(top + bottom),
        raw: data,
        channels: 1,
        filters,
        xtrans,
        wb_coeffs: raw.wb_coeffs,
        black_level: raw.blacklevels[0] as f32,
        white_level: raw.whitelevels[0] as f32,
        maker: raw.clean_make.clone(),
        model: raw.clean_model.clone(),
        orientation: convert_orientation(raw.orientation),
        monochrome: filters == 0,
        ..Default::default()
    })
    .wrap_err("Decoded raw file has an inconsistent geometry")?;
    Ok(image)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rggb_mask_matches_engine_lookup() {
        // RGGB pattern per rawloader convention.
        let pattern = [[0usize, 1], [1, 2]];
        let filters = pack_filters(|row, col| pattern[row % 2][col % 2]);
        assert_eq!(filters, rawpipe::image::FILTERS_RGGB);
        let xtrans = [[0; 6]; 6];
        for row in 0..4i64 {
            for col in 0..4i64 {
                assert_eq!(
                    rawpipe::image::filter_color(filters, &xtrans, row, col),
                    pattern[row as usize % 2][col as usize % 2]
                );
            }
        }
    }
}
