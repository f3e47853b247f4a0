// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end kernel workflow: import a closed STL body, embed it in a box,
//! fragment, mesh and write.

use intake_mesh_core::{save_stl, StlMesh};
use intake_mesh_kernel::{
    BoundaryQuery, BuiltinKernel, Dim, Entity, GeometryKernel, HealingOptions, KernelError,
    MeshOptions, Point3, Vector3, WriteOptions,
};

/// Outward-facing triangles of an axis-aligned cube.
fn cube_triangles(origin: Point3<f64>, edge: f64) -> Vec<[Point3<f64>; 3]> {
    let corner = |bits: usize| {
        origin
            + Vector3::new(
                if bits & 1 != 0 { edge } else { 0.0 },
                if bits & 2 != 0 { edge } else { 0.0 },
                if bits & 4 != 0 { edge } else { 0.0 },
            )
    };
    let faces: [[usize; 4]; 6] = [
        [0, 2, 3, 1],
        [4, 5, 7, 6],
        [0, 1, 5, 4],
        [1, 3, 7, 5],
        [3, 2, 6, 7],
        [2, 0, 4, 6],
    ];
    faces
        .iter()
        .flat_map(|f| {
            [
                [corner(f[0]), corner(f[1]), corner(f[2])],
                [corner(f[0]), corner(f[2]), corner(f[3])],
            ]
        })
        .collect()
}

fn kernel_with_body(dir: &tempfile::TempDir) -> (BuiltinKernel, Entity) {
    let path = dir.path().join("body.stl");
    save_stl(&StlMesh::new(cube_triangles(Point3::new(1.0, 1.0, 1.0), 2.0)), &path).unwrap();

    let mut kernel = BuiltinKernel::new();
    kernel.add_model("intake").unwrap();
    kernel.set_healing(HealingOptions::all(1e-2));
    kernel.merge(&path).unwrap();
    kernel.synchronize().unwrap();
    let surfaces = kernel.entities(Some(Dim::Surface)).unwrap();
    assert_eq!(surfaces.len(), 1);
    (kernel, surfaces[0])
}

#[test]
fn test_fragment_box_around_imported_body() {
    let dir = tempfile::tempdir().unwrap();
    let (mut kernel, body) = kernel_with_body(&dir);

    let bounds = kernel.bounding_box(body).unwrap();
    assert_eq!(bounds.max_extent(), 2.0);

    let domain = kernel
        .add_box(Point3::origin(), Vector3::new(4.0, 4.0, 4.0))
        .unwrap();
    assert!(matches!(
        kernel.fragment(&[domain], &[body]),
        Err(KernelError::NotSynchronized)
    ));
    kernel.synchronize().unwrap();

    let output = kernel.fragment(&[domain], &[body]).unwrap();
    assert_eq!(output.parent_map.len(), 2);
    assert_eq!(output.parent_map[0], vec![domain]);
    assert_eq!(output.parent_map[1], vec![body]);

    // The fluid volume is bounded by the box faces and the body surface
    let walls = kernel.boundary(&[domain], BoundaryQuery::default()).unwrap();
    assert_eq!(walls.len(), 7);
    assert!(walls.contains(&body));
}

#[test]
fn test_mesh_and_write_fluid_domain() {
    let dir = tempfile::tempdir().unwrap();
    let (mut kernel, body) = kernel_with_body(&dir);
    let domain = kernel
        .add_box(Point3::origin(), Vector3::new(4.0, 4.0, 4.0))
        .unwrap();
    kernel.synchronize().unwrap();
    kernel.fragment(&[domain], &[body]).unwrap();
    kernel.synchronize().unwrap();

    kernel
        .add_physical_group(Dim::Volume, &[domain.tag], "fluid")
        .unwrap();
    kernel
        .add_physical_group(Dim::Surface, &[body.tag], "intake")
        .unwrap();
    kernel
        .set_mesh_options(MeshOptions {
            size_max: 1.0,
            ..MeshOptions::default()
        })
        .unwrap();
    kernel.set_threads(2).unwrap();
    kernel.generate(Dim::Volume).unwrap();

    let stats = kernel.mesh_stats().unwrap();
    assert!(stats.tetrahedra > 0);
    assert_eq!(stats.inverted, 0);
    assert!(stats.triangles >= 12 + 6 * 2);

    let out = dir.path().join("fluid.msh");
    kernel.write(&out, &WriteOptions::default()).unwrap();
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"$MeshFormat\n4.1 1 8\n"));
    assert!(bytes.ends_with(b"$EndElements\n"));
}

#[test]
fn test_remove_model_discards_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (mut kernel, _) = kernel_with_body(&dir);
    kernel.remove_model().unwrap();
    kernel.add_model("next").unwrap();
    assert!(kernel.entities(None).unwrap().is_empty());
    assert!(kernel.model_bounding_box().unwrap().is_none());
}
