// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Iterative color smoothing: a 3x3 median over the R-G and B-G differences,
//! re-anchored on green each pass. Knocks down residual demosaic speckle
//! without touching luminance.

use crate::util::parallel;

fn median9(mut v: [f32; 9]) -> f32 {
    v.sort_by(f32::total_cmp);
    v[4]
}

pub fn color_smoothing(buf: &mut [f32], width: usize, height: usize, passes: usize) {
    if width < 3 || height < 3 {
        return;
    }
    for _ in 0..passes {
        let snapshot = buf.to_vec();
        parallel::for_each_row(buf, width * 4, |j, row| {
            if j == 0 || j >= height - 1 {
                return;
            }
            for i in 1..width - 1 {
                let g = snapshot[(j * width + i) * 4 + 1];
                for c in [0usize, 2] {
                    let mut window = [0f32; 9];
                    let mut k = 0;
                    for dj in -1i64..=1 {
                        for di in -1i64..=1 {
                            let idx =
                                (((j as i64 + dj) * width as i64 + i as i64 + di) * 4) as usize;
                            window[k] = snapshot[idx + c] - snapshot[idx + 1];
                            k += 1;
                        }
                    }
                    row[i * 4 + c] = (g + median9(window)).max(0.0);
                }
            }
        });
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn uniform_image_is_a_fixed_point() {
        let (w, h) = (6, 6);
        let mut buf: Vec<f32> = (0..w * h).flat_map(|_| [0.4, 0.5, 0.6, 0.0]).collect();
        let before = buf.clone();
        color_smoothing(&mut buf, w, h, 3);
        for (a, b) in buf.iter().zip(before.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn chroma_impulse_is_removed() {
        let (w, h) = (7, 7);
        let mut buf: Vec<f32> = (0..w * h).flat_map(|_| [0.4, 0.5, 0.4, 0.0]).collect();
        buf[(3 * w + 3) * 4] = 2.0;
        color_smoothing(&mut buf, w, h, 1);
        assert!((buf[(3 * w + 3) * 4] - 0.4).abs() < 1e-6);
    }
}
