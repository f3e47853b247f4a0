// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Only one kernel session may be open per process.
static SESSION_LOCK: Mutex<()> = Mutex::new(());

pub fn session_lock() -> MutexGuard<'static, ()> {
    SESSION_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

const BOX_FACES: [[usize; 4]; 6] = [
    [0, 2, 3, 1],
    [4, 5, 7, 6],
    [0, 1, 5, 4],
    [1, 3, 7, 5],
    [3, 2, 6, 7],
    [2, 0, 4, 6],
];

/// STEP file with one faceted solid per `(origin, size)` box, in millimetres.
pub fn write_step_boxes(dir: &Path, name: &str, boxes: &[([f64; 3], [f64; 3])]) -> PathBuf {
    let mut data = String::new();
    for (n, (origin, size)) in boxes.iter().enumerate() {
        let base = 100 * (n + 1);
        for bits in 0..8usize {
            let mut p = *origin;
            for axis in 0..3 {
                if bits & (1 << axis) != 0 {
                    p[axis] += size[axis];
                }
            }
            data.push_str(&format!(
                "#{}=CARTESIAN_POINT('',({:?},{:?},{:?}));\n",
                base + bits,
                p[0],
                p[1],
                p[2]
            ));
        }
        let mut face_ids = Vec::new();
        for (i, face) in BOX_FACES.iter().enumerate() {
            let refs: Vec<String> = face.iter().map(|c| format!("#{}", base + c)).collect();
            let (lp, bound, surface) = (base + 10 + i, base + 20 + i, base + 30 + i);
            data.push_str(&format!("#{}=POLY_LOOP('',({}));\n", lp, refs.join(",")));
            data.push_str(&format!("#{}=FACE_OUTER_BOUND('',#{},.T.);\n", bound, lp));
            data.push_str(&format!("#{}=FACE_SURFACE('',(#{}),#99,.T.);\n", surface, bound));
            face_ids.push(format!("#{}", surface));
        }
        data.push_str(&format!("#{}=CLOSED_SHELL('',({}));\n", base + 40, face_ids.join(",")));
        data.push_str(&format!("#{}=MANIFOLD_SOLID_BREP('box',#{});\n", base + 41, base + 40));
    }

    let path = dir.join(name);
    std::fs::write(
        &path,
        format!(
            "ISO-10303-21;\nHEADER;\nFILE_SCHEMA(('AUTOMOTIVE_DESIGN'));\nENDSEC;\nDATA;\n{}ENDSEC;\nEND-ISO-10303-21;\n",
            data
        ),
    )
    .unwrap();
    path
}

pub fn write_step_box(dir: &Path, origin: [f64; 3], size: [f64; 3]) -> PathBuf {
    write_step_boxes(dir, "box.step", &[(origin, size)])
}
