// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The single point where pixel kernels fan out over worker threads. Kernels
//! receive disjoint row slices of the output buffer and never write to their
//! input, so a plain parallel chunk iteration is all that is needed.

/// Runs `f(row_index, row)` for every `row_stride`-sized chunk of `data`.
#[cfg(feature = "parallel")]
pub fn for_each_row<T, F>(data: &mut [T], row_stride: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    use rayon::prelude::*;
    data.par_chunks_mut(row_stride)
        .enumerate()
        .for_each(|(y, row)| f(y, row));
}

#[cfg(not(feature = "parallel"))]
pub fn for_each_row<T, F>(data: &mut [T], row_stride: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    for (y, row) in data.chunks_mut(row_stride).enumerate() {
        f(y, row);
    }
}

/// Like [`for_each_row`] but over bands of `rows_per_band` rows, for kernels
/// whose writes span more than one output row per input row.
#[cfg(feature = "parallel")]
pub fn for_each_band<T, F>(data: &mut [T], row_stride: usize, rows_per_band: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    use rayon::prelude::*;
    data.par_chunks_mut(row_stride * rows_per_band)
        .enumerate()
        .for_each(|(b, band)| f(b, band));
}

#[cfg(not(feature = "parallel"))]
pub fn for_each_band<T, F>(data: &mut [T], row_stride: usize, rows_per_band: usize, f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Send + Sync,
{
    for (b, band) in data.chunks_mut(row_stride * rows_per_band).enumerate() {
        f(b, band);
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn rows_are_disjoint_and_ordered() {
        let mut data = vec![0f32; 4 * 8];
        for_each_row(&mut data, 8, |y, row| {
            for v in row.iter_mut() {
                *v = y as f32;
            }
        });
        for (y, row) in data.chunks(8).enumerate() {
            assert!(row.iter().all(|&v| v == y as f32));
        }
    }
}
