// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Green equilibration. Sensors whose two green grids sit in different rows
//! can disagree slightly; left alone that disagreement demosaics into a maze
//! pattern. The full variant applies one global ratio of the two grid sums,
//! the local variant a 3x3 ratio gated by local chroma and a 95%-of-max
//! ceiling.

use crate::image::filter_color;
use crate::util::parallel;

const LOCAL_CHROMA_THRESHOLD: f32 = 0.0001;

fn is_second_green(filters: u32, row: i64, col: i64) -> bool {
    let xtrans = [[0u8; 6]; 6];
    let c = filter_color(filters, &xtrans, row, col);
    (c == 1 || c == 3) && row % 2 == 1
}

fn is_first_green(filters: u32, row: i64, col: i64) -> bool {
    let xtrans = [[0u8; 6]; 6];
    let c = filter_color(filters, &xtrans, row, col);
    (c == 1 || c == 3) && row % 2 == 0
}

/// Scales every second-grid green by the global ratio of the grid sums.
pub fn full_average(buf: &mut [f32], width: usize, height: usize, ox: i64, oy: i64, filters: u32) {
    let mut sum1 = 0f64;
    let mut sum2 = 0f64;
    for j in 0..height {
        for i in 0..width {
            let (row, col) = (oy + j as i64, ox + i as i64);
            let v = buf[j * width + i] as f64;
            if is_first_green(filters, row, col) {
                sum1 += v;
            } else if is_second_green(filters, row, col) {
                sum2 += v;
            }
        }
    }
    if sum2 <= 0.0 {
        return;
    }
    let ratio = (sum1 / sum2) as f32;
    parallel::for_each_row(buf, width, move |j, row| {
        for (i, v) in row.iter_mut().enumerate() {
            if is_second_green(filters, oy + j as i64, ox + i as i64) {
                *v *= ratio;
            }
        }
    });
}

/// Applies a 3x3 local ratio to each second-grid green whose neighborhood is
/// chromatically flat and whose center is below 95% of `maximum`.
pub fn local_average(
    buf: &mut [f32],
    width: usize,
    height: usize,
    ox: i64,
    oy: i64,
    filters: u32,
    maximum: f32,
) {
    let snapshot = buf.to_vec();
    let thr = maximum * LOCAL_CHROMA_THRESHOLD;
    parallel::for_each_row(buf, width, |j, row| {
        if j < 2 || j >= height - 2 {
            return;
        }
        for i in 2..width - 2 {
            if !is_second_green(filters, oy + j as i64, ox + i as i64) {
                continue;
            }
            let at = |dj: i64, di: i64| {
                snapshot[((j as i64 + dj) * width as i64 + i as i64 + di) as usize]
            };
            let center = at(0, 0);
            if center >= maximum * 0.95 {
                continue;
            }
            // Other-grid greens on the diagonals, same-grid at distance two.
            let o1 = [at(-1, -1), at(-1, 1), at(1, -1), at(1, 1)];
            let o2 = [at(-2, 0), at(2, 0), at(0, -2), at(0, 2)];
            let spread = |o: &[f32; 4]| {
                ((o[0] - o[1]).abs()
                    + (o[0] - o[2]).abs()
                    + (o[0] - o[3]).abs()
                    + (o[1] - o[2]).abs()
                    + (o[1] - o[3]).abs()
                    + (o[2] - o[3]).abs())
                    / 6.0
            };
            if spread(&o1) >= thr || spread(&o2) >= thr {
                continue;
            }
            let m1 = o1.iter().sum::<f32>() / 4.0;
            let m2 = (o2.iter().sum::<f32>() + center) / 5.0;
            if m2 > 0.0 {
                row[i] = center * m1 / m2;
            }
        }
    });
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::image::FILTERS_RGGB;

    #[test]
    fn full_average_balances_the_grids() {
        let (w, h) = (8, 8);
        let mut buf = vec![0f32; w * h];
        for j in 0..h {
            for i in 0..w {
                let row = j as i64;
                let col = i as i64;
                buf[j * w + i] = if is_first_green(FILTERS_RGGB, row, col) {
                    1.0
                } else if is_second_green(FILTERS_RGGB, row, col) {
                    0.5
                } else {
                    0.3
                };
            }
        }
        full_average(&mut buf, w, h, 0, 0, FILTERS_RGGB);
        for j in 0..h {
            for i in 0..w {
                if is_second_green(FILTERS_RGGB, j as i64, i as i64) {
                    assert!((buf[j * w + i] - 1.0).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn local_average_skips_near_saturation() {
        let (w, h) = (8, 8);
        let mut buf = vec![0.98f32; w * h];
        let before = buf.clone();
        local_average(&mut buf, w, h, 0, 0, FILTERS_RGGB, 1.0);
        assert_eq!(buf, before);
    }
}
