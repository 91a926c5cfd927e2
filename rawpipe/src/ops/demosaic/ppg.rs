// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! PPG demosaicing for Bayer sensors. Three phases over the mosaic: border
//! fill, green interpolation with a Hamilton-Adams quarter-sum, then
//! green-guided color interpolation. An optional conditional median runs
//! over the mosaic before any of it.

use crate::image::filter_color;
use crate::util::parallel;

/// CFA color collapsed to an output channel (both greens land on 1).
#[inline]
pub fn chan(c: usize) -> usize {
    if c == 3 { 1 } else { c }
}

#[inline]
fn median9(mut v: [f32; 9]) -> f32 {
    v.sort_by(f32::total_cmp);
    v[4]
}

/// One-pass 3x3 conditional median over the mosaic, per CFA color (the
/// same-color grid has stride 2). Samples further than `threshold` from the
/// center are banished by +64 before the median is taken; a center whose
/// only conformer is itself gets its pick un-banished.
pub fn pre_median(
    out: &mut [f32],
    input: &[f32],
    width: usize,
    height: usize,
    threshold: f32,
) {
    parallel::for_each_row(out, width, |j, row| {
        for (i, out_px) in row.iter_mut().enumerate() {
            let pc = input[j * width + i];
            let mut med = [0f32; 9];
            let mut conformers = 0usize;
            let mut k = 0usize;
            for dj in [-2i64, 0, 2] {
                for di in [-2i64, 0, 2] {
                    let jj = (j as i64 + dj).clamp(0, height as i64 - 1) as usize;
                    let ii = (i as i64 + di).clamp(0, width as i64 - 1) as usize;
                    let val = input[jj * width + ii];
                    if (val - pc).abs() < threshold {
                        med[k] = val;
                        conformers += 1;
                    } else {
                        med[k] = 64.0 + val;
                    }
                    k += 1;
                }
            }
            let pick = median9(med);
            *out_px = if conformers == 1 { pick - 64.0 } else { pick };
        }
    });
}

/// Full PPG interpolation of a 1-channel Bayer mosaic into 4-channel RGBA.
/// `(ox, oy)` is the absolute sensor position of the buffer origin, which
/// fixes the CFA phase. Alpha is zeroed.
pub fn demosaic_ppg(
    out: &mut [f32],
    input: &[f32],
    width: usize,
    height: usize,
    ox: i64,
    oy: i64,
    filters: u32,
) {
    let xtrans = [[0u8; 6]; 6];
    let fc = |j: i64, i: i64| filter_color(filters, &xtrans, oy + j, ox + i);

    let mut green = vec![0f32; width * height * 4];

    // Phase 1: border fill, outermost three rows and columns, plus the raw
    // sensel copy for every interior pixel so phase 3 can read same-color
    // neighbors directly.
    border_fill(&mut green, input, width, height, &fc, 3);

    // Phase 2: green interpolation away from the border.
    if width > 6 && height > 6 {
        interpolate_green(&mut green, input, width, height, &fc);
    }

    // Phase 3: red/blue from the green-guided neighbors.
    out.copy_from_slice(&green);
    if width > 2 && height > 2 {
        interpolate_color(out, &green, width, height, &fc);
    }
}

fn border_fill<F: Fn(i64, i64) -> usize + Sync>(
    out: &mut [f32],
    input: &[f32],
    width: usize,
    height: usize,
    fc: &F,
    border: usize,
) {
    parallel::for_each_row(out, width * 4, |j, row| {
        for i in 0..width {
            let interior = j >= border
                && j < height.saturating_sub(border)
                && i >= border
                && i < width.saturating_sub(border);
            let own_c = fc(j as i64, i as i64);
            let own = input[j * width + i];
            let px = &mut row[i * 4..i * 4 + 4];
            if interior {
                // Seed the sensel's own channel; phases 2 and 3 fill the rest.
                px.fill(0.0);
                px[chan(own_c)] = own;
                continue;
            }
            let mut sum = [0f32; 3];
            let mut cnt = [0u32; 3];
            for dj in -1i64..=1 {
                for di in -1i64..=1 {
                    let jj = j as i64 + dj;
                    let ii = i as i64 + di;
                    if jj < 0 || ii < 0 || jj >= height as i64 || ii >= width as i64 {
                        continue;
                    }
                    let c = chan(fc(jj, ii));
                    sum[c] += input[jj as usize * width + ii as usize];
                    cnt[c] += 1;
                }
            }
            for c in 0..3 {
                px[c] = if cnt[c] > 0 { sum[c] / cnt[c] as f32 } else { own };
            }
            px[3] = 0.0;
        }
    });
}

fn interpolate_green<F: Fn(i64, i64) -> usize + Sync>(
    out: &mut [f32],
    input: &[f32],
    width: usize,
    height: usize,
    fc: &F,
) {
    let w = width as i64;
    parallel::for_each_row(out, width * 4, |j, row| {
        if j < 3 || j >= height - 3 {
            return;
        }
        for i in 3..width - 3 {
            let c = fc(j as i64, i as i64);
            let px = &mut row[i * 4..i * 4 + 4];
            if chan(c) == 1 {
                px[1] = input[j * width + i];
                continue;
            }
            let at = |o: i64| input[(j as i64 * w + i as i64 + o) as usize];
            let pc = at(0);
            // Horizontal: +-1 are greens, +-2 the same color, +-3 greens.
            let (pxm1, pxm2, pxm3) = (at(-1), at(-2), at(-3));
            let (pxp1, pxp2, pxp3) = (at(1), at(2), at(3));
            let guess_x = (pxm1 + pc + pxp1) * 2.0 - pxp2 - pxm2;
            let diff_x = ((pxm2 - pc).abs() + (pxp2 - pc).abs() + (pxm1 - pxp1).abs()) * 3.0
                + ((pxp3 - pxp1).abs() + (pxm3 - pxm1).abs()) * 2.0;
            let (pym1, pym2, pym3) = (at(-w), at(-2 * w), at(-3 * w));
            let (pyp1, pyp2, pyp3) = (at(w), at(2 * w), at(3 * w));
            let guess_y = (pym1 + pc + pyp1) * 2.0 - pyp2 - pym2;
            let diff_y = ((pym2 - pc).abs() + (pyp2 - pc).abs() + (pym1 - pyp1).abs()) * 3.0
                + ((pyp3 - pyp1).abs() + (pym3 - pym1).abs()) * 2.0;
            let (guess, lo, hi) = if diff_x < diff_y {
                (guess_x, pxm1.min(pxp1), pxm1.max(pxp1))
            } else {
                (guess_y, pym1.min(pyp1), pym1.max(pyp1))
            };
            px[chan(c)] = pc;
            px[1] = (guess * 0.25).clamp(lo, hi);
        }
    });
}

fn interpolate_color<F: Fn(i64, i64) -> usize + Sync>(
    out: &mut [f32],
    green: &[f32],
    width: usize,
    height: usize,
    fc: &F,
) {
    parallel::for_each_row(out, width * 4, |j, row| {
        if j == 0 || j >= height - 1 {
            return;
        }
        let at = |jj: usize, ii: usize, c: usize| green[(jj * width + ii) * 4 + c];
        for i in 1..width - 1 {
            let c = chan(fc(j as i64, i as i64));
            let px = &mut row[i * 4..i * 4 + 4];
            let g = at(j, i, 1);
            if c == 1 {
                // Green pixel: red and blue come from the horizontal and
                // vertical neighbor pairs, guided by their greens.
                let cl = chan(fc(j as i64, i as i64 - 1));
                let ct = chan(fc(j as i64 - 1, i as i64));
                px[cl] = ((at(j, i - 1, cl) + at(j, i + 1, cl) + 2.0 * g
                    - at(j, i - 1, 1)
                    - at(j, i + 1, 1))
                    * 0.5)
                    .max(0.0);
                px[ct] = ((at(j - 1, i, ct) + at(j + 1, i, ct) + 2.0 * g
                    - at(j - 1, i, 1)
                    - at(j + 1, i, 1))
                    * 0.5)
                    .max(0.0);
            } else {
                // Red or blue pixel: the opposite color sits on the
                // diagonals; pick the pair with the smaller gradient.
                let other = 2 - c;
                let d1 = ((j - 1, i - 1), (j + 1, i + 1));
                let d2 = ((j - 1, i + 1), (j + 1, i - 1));
                let grad = |d: ((usize, usize), (usize, usize))| {
                    (at(d.0.0, d.0.1, other) - at(d.1.0, d.1.1, other)).abs()
                        + (at(d.0.0, d.0.1, 1) - g).abs()
                        + (at(d.1.0, d.1.1, 1) - g).abs()
                };
                let d = if grad(d1) < grad(d2) { d1 } else { d2 };
                px[other] = ((at(d.0.0, d.0.1, other) + at(d.1.0, d.1.1, other) + 2.0 * g
                    - at(d.0.0, d.0.1, 1)
                    - at(d.1.0, d.1.1, 1))
                    * 0.5)
                    .max(0.0);
            }
        }
    });
}
