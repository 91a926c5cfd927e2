// Copyright (c) the Rawpipe Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

pub fn assert_almost_abs_eq(a: f32, b: f32, max_error: f32) {
    assert!(
        (a - b).abs() <= max_error,
        "{a} != {b} (max error {max_error})"
    );
}

pub fn assert_all_almost_abs_eq(a: &[f32], b: &[f32], max_error: f32) {
    assert_eq!(a.len(), b.len());
    for (&x, &y) in a.iter().zip(b.iter()) {
        assert_almost_abs_eq(x, y, max_error);
    }
}
