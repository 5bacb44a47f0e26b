use std::f64::consts::{PI, TAU};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use slicer::{
    mesh::Mesh,
    slicer::{intersect_plane, Buckets, PointArena},
    Pos,
};

fn sphere(rings: usize, segments: usize) -> Mesh {
    let point = |ring: usize, segment: usize| {
        let (phi, theta) = (PI * ring as f64 / rings as f64, TAU * segment as f64 / segments as f64);
        Pos::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos()) * 10.0
    };

    let mut vertices = Vec::new();
    for ring in 0..rings {
        for segment in 0..segments {
            let (a, b) = (point(ring, segment), point(ring, segment + 1));
            let (c, d) = (point(ring + 1, segment), point(ring + 1, segment + 1));
            vertices.extend([a, c, b, b, c, d]);
        }
    }

    Mesh::from_triangles(vertices).unwrap()
}

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Plane Intersections");

    for rings in [32, 128, 512] {
        let mesh = sphere(rings, rings * 2);
        let buckets = Buckets::from_mesh(&mesh);

        group.bench_with_input(BenchmarkId::new("Linear", rings), &mesh, |b, mesh| {
            b.iter(|| {
                let mut points = PointArena::default();
                intersect_plane(mesh, 0..mesh.face_count(), 2.5, &mut points)
            })
        });

        group.bench_with_input(
            BenchmarkId::new("Buckets", rings),
            &(buckets, mesh),
            |b, (buckets, mesh)| {
                b.iter(|| {
                    let mut points = PointArena::default();
                    let faces = buckets.faces_at(2.5).iter().copied();
                    intersect_plane(mesh, faces, 2.5, &mut points)
                })
            },
        );
    }
}

criterion_group!(benches, bench);
criterion_main!(benches);
