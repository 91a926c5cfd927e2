// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Colorspace tags carried by buffer descriptors and the in-place transforms
//! the scheduler inserts when a module's declared input colorspace differs
//! from the upstream buffer. The real ICC/CMS transform is an external
//! collaborator; these are the engine-internal working space conversions.

use crate::error::{Error, Result};
use crate::util::parallel;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorSpace {
    None,
    Raw,
    Lab,
    Rgb,
    Lch,
    Hsl,
    JzCzhz,
}

impl ColorSpace {
    pub fn label(self) -> &'static str {
        match self {
            ColorSpace::None => "none",
            ColorSpace::Raw => "raw",
            ColorSpace::Lab => "lab",
            ColorSpace::Rgb => "rgb",
            ColorSpace::Lch => "lch",
            ColorSpace::Hsl => "hsl",
            ColorSpace::JzCzhz => "jzczhz",
        }
    }
}

// sRGB D65 linear <-> XYZ.
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];
const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.2404542, -1.5371385, -0.4985314],
    [-0.9692660, 1.8760108, 0.0415560],
    [0.0556434, -0.2040259, 1.0572252],
];
const D65: [f32; 3] = [0.95047, 1.0, 1.08883];

fn lab_f(t: f32) -> f32 {
    const EPS: f32 = 216.0 / 24389.0;
    const KAPPA: f32 = 24389.0 / 27.0;
    if t > EPS {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    const EPS: f32 = 6.0 / 29.0;
    if t > EPS {
        t * t * t
    } else {
        3.0 * EPS * EPS * (t - 4.0 / 29.0)
    }
}

pub fn rgb_to_lab(px: &mut [f32]) {
    let mut xyz = [0f32; 3];
    for (i, x) in xyz.iter_mut().enumerate() {
        *x = RGB_TO_XYZ[i][0].mul_add(
            px[0],
            RGB_TO_XYZ[i][1].mul_add(px[1], RGB_TO_XYZ[i][2] * px[2]),
        );
    }
    let fx = lab_f(xyz[0] / D65[0]);
    let fy = lab_f(xyz[1] / D65[1]);
    let fz = lab_f(xyz[2] / D65[2]);
    px[0] = 116.0 * fy - 16.0;
    px[1] = 500.0 * (fx - fy);
    px[2] = 200.0 * (fy - fz);
}

pub fn lab_to_rgb(px: &mut [f32]) {
    let fy = (px[0] + 16.0) / 116.0;
    let fx = fy + px[1] / 500.0;
    let fz = fy - px[2] / 200.0;
    let xyz = [
        lab_f_inv(fx) * D65[0],
        lab_f_inv(fy) * D65[1],
        lab_f_inv(fz) * D65[2],
    ];
    for i in 0..3 {
        px[i] = XYZ_TO_RGB[i][0].mul_add(
            xyz[0],
            XYZ_TO_RGB[i][1].mul_add(xyz[1], XYZ_TO_RGB[i][2] * xyz[2]),
        );
    }
}

pub fn lab_to_lch(px: &mut [f32]) {
    let (a, b) = (px[1], px[2]);
    px[1] = (a * a + b * b).sqrt();
    px[2] = b.atan2(a);
}

pub fn lch_to_lab(px: &mut [f32]) {
    let (c, h) = (px[1], px[2]);
    px[1] = c * h.cos();
    px[2] = c * h.sin();
}

pub fn rgb_to_hsl(px: &mut [f32]) {
    let (r, g, b) = (px[0], px[1], px[2]);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let d = max - min;
    let (h, s) = if d <= f32::EPSILON {
        (0.0, 0.0)
    } else {
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h / 6.0, s)
    };
    px[0] = h;
    px[1] = s;
    px[2] = l;
}

fn hue_to_rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

pub fn hsl_to_rgb(px: &mut [f32]) {
    let (h, s, l) = (px[0], px[1], px[2]);
    if s <= f32::EPSILON {
        px[0] = l;
        px[1] = l;
        px[2] = l;
        return;
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    px[0] = hue_to_rgb(p, q, h + 1.0 / 3.0);
    px[1] = hue_to_rgb(p, q, h);
    px[2] = hue_to_rgb(p, q, h - 1.0 / 3.0);
}

fn per_pixel(f: fn(&mut [f32])) -> impl Fn(&mut [f32]) + Send + Sync {
    move |row: &mut [f32]| {
        for px in row.chunks_mut(4) {
            f(px);
        }
    }
}

/// Transforms a 4-channel interleaved buffer in place. Alpha is untouched.
/// Unreachable pairs (anything involving `Raw`) report an error instead of
/// silently relabeling.
pub fn transform(buf: &mut [f32], width: usize, from: ColorSpace, to: ColorSpace) -> Result<()> {
    if from == to || from == ColorSpace::None || to == ColorSpace::None {
        return Ok(());
    }
    let steps: &[fn(&mut [f32])] = match (from, to) {
        (ColorSpace::Rgb, ColorSpace::Lab) => &[rgb_to_lab],
        (ColorSpace::Lab, ColorSpace::Rgb) => &[lab_to_rgb],
        (ColorSpace::Lab, ColorSpace::Lch) => &[lab_to_lch],
        (ColorSpace::Lch, ColorSpace::Lab) => &[lch_to_lab],
        (ColorSpace::Rgb, ColorSpace::Lch) => &[rgb_to_lab, lab_to_lch],
        (ColorSpace::Lch, ColorSpace::Rgb) => &[lch_to_lab, lab_to_rgb],
        (ColorSpace::Rgb, ColorSpace::Hsl) => &[rgb_to_hsl],
        (ColorSpace::Hsl, ColorSpace::Rgb) => &[hsl_to_rgb],
        (from, to) => return Err(Error::UnsupportedColorspace(from, to)),
    };
    for step in steps {
        let kernel = per_pixel(*step);
        parallel::for_each_row(buf, width * 4, move |_y, row| kernel(row));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::util::test::assert_all_almost_abs_eq;

    #[test]
    fn lab_round_trip() {
        let mut px = [0.2, 0.5, 0.8, 1.0];
        let orig = px;
        rgb_to_lab(&mut px);
        lab_to_rgb(&mut px);
        assert_all_almost_abs_eq(&px[..3], &orig[..3], 1e-4);
    }

    #[test]
    fn white_is_l100() {
        let mut px = [1.0, 1.0, 1.0, 1.0];
        rgb_to_lab(&mut px);
        assert!((px[0] - 100.0).abs() < 1e-2);
        assert!(px[1].abs() < 1e-2 && px[2].abs() < 1e-2);
    }

    #[test]
    fn hsl_round_trip() {
        let mut px = [0.25, 0.75, 0.1, 1.0];
        let orig = px;
        rgb_to_hsl(&mut px);
        hsl_to_rgb(&mut px);
        assert_all_almost_abs_eq(&px[..3], &orig[..3], 1e-5);
    }

    #[test]
    fn raw_has_no_transform() {
        let mut buf = vec![0.0; 8];
        assert!(transform(&mut buf, 2, ColorSpace::Raw, ColorSpace::Rgb).is_err());
    }

    #[test]
    fn routed_transform_matches_composition() {
        let mut a = vec![0.1, 0.6, 0.3, 1.0];
        let mut b = a.clone();
        transform(&mut a, 1, ColorSpace::Rgb, ColorSpace::Lch).unwrap();
        rgb_to_lab(&mut b);
        lab_to_lch(&mut b);
        assert_all_almost_abs_eq(&a, &b, 1e-6);
    }
}
