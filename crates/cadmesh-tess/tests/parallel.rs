//! 多进程并行细分集成测试（启动真实的 cadmesh-worker 进程）

#![cfg(target_os = "linux")]

use cadmesh_core::geometry::Curve;
use cadmesh_core::math::{Placement, Point3};
use cadmesh_core::shape::{Edge, Shape, ShapeData};
use cadmesh_tess::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn pool_config(dir: &Path, workers: usize) -> PoolConfig {
    PoolConfig::new(env!("CARGO_BIN_EXE_cadmesh-worker"), workers).with_shm_dir(dir)
}

fn segment_count(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn scene() -> Group {
    let cube = Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap();
    let cylinder = Shape::cylinder(Point3::origin(), 0.5, 2.0).unwrap();
    let sphere = Shape::sphere(Point3::origin(), 1.0).unwrap();
    let wire = Shape::wire(
        &[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ],
        false,
    )
    .unwrap();

    Group::new("Group")
        .with_child(Part::new("cube", cube.clone()))
        .with_child(
            Group::new("sub")
                .with_placement(Placement::translation(3.0, 0.0, 0.0))
                .with_child(Part::new("cylinder", cylinder))
                .with_child(Part::new("sphere", sphere).with_placement(Placement::translation(0.0, 3.0, 0.0))),
        )
        .with_child(Part::new("cube", cube).with_placement(Placement::translation(0.0, 0.0, 5.0)))
        .with_child(Part::new("wire", wire))
}

fn dangling_shape() -> Shape {
    Shape::new(ShapeData {
        edges: vec![Edge::new(
            Curve::Line {
                start: Point3::origin(),
                end: Point3::new(1.0, 0.0, 0.0),
            },
            vec![3],
        )],
        ..Default::default()
    })
}

#[test]
fn test_parallel_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let root = scene();

    let mut sequential = Renderer::new(RenderConfig::default()).unwrap();
    let expected = sequential.render(&root).unwrap();

    let config = RenderConfig {
        parallel: true,
        ..Default::default()
    };
    let mut parallel = Renderer::new(config)
        .unwrap()
        .with_pool_config(pool_config(dir.path(), 2));
    assert!(parallel.use_parallel(root.count_leaves()));
    let output = parallel.render(&root).unwrap();

    assert_eq!(output.bb, expected.bb);
    assert_eq!(output.states, expected.states);
    assert_eq!(output.to_json(), expected.to_json());

    // 池在多次渲染之间复用
    let again = parallel.render(&root).unwrap();
    assert_eq!(again.to_json(), expected.to_json());

    parallel.shutdown();
    assert_eq!(segment_count(dir.path()), 0);
}

#[test]
fn test_dispatch_then_resolve() {
    let dir = TempDir::new().unwrap();
    let mut pool = WorkerPool::start(&pool_config(dir.path(), 2)).unwrap();
    assert_eq!(pool.alive_count(), 2);

    let shape = Shape::cuboid(Point3::origin(), Point3::new(2.0, 1.0, 1.0)).unwrap();
    let request = TessRequest {
        shape: shape.clone(),
        placement: Placement::translation(1.0, 0.0, 0.0),
        params: TessParams::default(),
    };
    let expected = tessellate(&request.shape, &request.placement, &request.params).unwrap();

    let mut cache = MeshCache::new();
    {
        let mut backend = ParallelTessellator::new(&mut pool);
        let handle = match backend.submit(&request, &mut cache).unwrap() {
            LeafMesh::Pending(handle) => handle,
            LeafMesh::Ready(_) => panic!("expected a pending handle"),
        };
        assert_eq!(backend.phase(&handle), Some(JobPhase::Dispatched));
        assert_eq!(backend.outstanding(), 1);
        assert_eq!(segment_count(dir.path()), 1);
        assert!(matches!(
            cache.lookup(&request.cache_key()),
            Some(CacheEntry::Pending(_))
        ));

        let result = backend.resolve(&handle, &mut cache).unwrap();
        assert_eq!(backend.phase(&handle), Some(JobPhase::Resolved));
        assert_eq!(backend.outstanding(), 0);
        assert_eq!(segment_count(dir.path()), 0);
        assert_eq!(*result, expected);

        // 再次取回直接返回保存的结果
        let again = backend.resolve(&handle, &mut cache).unwrap();
        assert!(std::sync::Arc::ptr_eq(&result, &again));
    }

    assert!(matches!(
        cache.lookup(&request.cache_key()),
        Some(CacheEntry::Ready(_))
    ));
    pool.shutdown();
}

#[test]
fn test_identical_leaves_dispatched_once() {
    let dir = TempDir::new().unwrap();
    let mut pool = WorkerPool::start(&pool_config(dir.path(), 1)).unwrap();

    let request = TessRequest {
        shape: Shape::sphere(Point3::origin(), 1.0).unwrap(),
        placement: Placement::identity(),
        params: TessParams::default(),
    };

    let mut cache = MeshCache::new();
    let mut backend = ParallelTessellator::new(&mut pool);
    let first = backend.submit(&request, &mut cache).unwrap();
    let second = backend.submit(&request, &mut cache).unwrap();

    let (a, b) = match (first, second) {
        (LeafMesh::Pending(a), LeafMesh::Pending(b)) => (a, b),
        _ => panic!("expected pending handles"),
    };
    assert_eq!(a, b);
    assert_eq!(backend.outstanding(), 1);

    let ra = backend.resolve(&a, &mut cache).unwrap();
    let rb = backend.resolve(&b, &mut cache).unwrap();
    assert!(std::sync::Arc::ptr_eq(&ra, &rb));
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_worker_failure_releases_segment() {
    let dir = TempDir::new().unwrap();
    let mut pool = WorkerPool::start(&pool_config(dir.path(), 1)).unwrap();

    let shape = dangling_shape();
    let params = TessParams::default();
    let placement = Placement::identity();
    let key = CacheKey::new(&shape, &placement, &params);

    let mut cache = MeshCache::new();
    {
        let mut coordinator = Coordinator::new(&mut pool);
        let handle = coordinator.dispatch(&shape, &placement, &params, key).unwrap();
        cache.insert_pending(key, handle.clone());

        let err = coordinator.resolve(&handle, &mut cache).unwrap_err();
        assert!(matches!(err, TessError::WorkerFailure(_)));
        assert_eq!(coordinator.phase(&handle), Some(JobPhase::Failed));
        assert_eq!(segment_count(dir.path()), 0);

        // 失败结果同样被记住
        assert!(matches!(
            coordinator.resolve(&handle, &mut cache),
            Err(TessError::WorkerFailure(_))
        ));
    }

    // 工作进程报告失败后仍然可用
    assert_eq!(pool.alive_count(), 1);
    pool.shutdown();
}

#[test]
fn test_render_failure_propagates() {
    let dir = TempDir::new().unwrap();
    let root = Group::new("Group")
        .with_child(Part::new(
            "ok",
            Shape::cuboid(Point3::origin(), Point3::new(1.0, 1.0, 1.0)).unwrap(),
        ))
        .with_child(Part::new("broken", dangling_shape()));

    let config = RenderConfig {
        parallel: true,
        ..Default::default()
    };
    let mut renderer = Renderer::new(config)
        .unwrap()
        .with_pool_config(pool_config(dir.path(), 2));

    assert!(matches!(
        renderer.render(&root),
        Err(TessError::WorkerFailure(_))
    ));
    assert_eq!(segment_count(dir.path()), 0);

    // 工作进程报告的细分失败不会停止进程池
    assert_eq!(renderer.worker_pool().map(|p| p.alive_count()), Some(2));
    let healthy = scene();
    assert!(renderer.render(&healthy).is_ok());
    assert_eq!(renderer.worker_pool().map(|p| p.alive_count()), Some(2));
}

#[test]
fn test_exited_worker_drops_pool() {
    let dir = TempDir::new().unwrap();
    let config = RenderConfig {
        parallel: true,
        ..Default::default()
    };
    // 立即退出的程序代替工作进程
    let mut renderer = Renderer::new(config)
        .unwrap()
        .with_pool_config(PoolConfig::new("true", 1).with_shm_dir(dir.path()));

    assert!(matches!(
        renderer.render(&scene()),
        Err(TessError::WorkerFailure(_))
    ));
    assert!(renderer.worker_pool().is_none());
    assert_eq!(segment_count(dir.path()), 0);
}

#[test]
fn test_unknown_handle() {
    let dir = TempDir::new().unwrap();
    let mut pool = WorkerPool::start(&pool_config(dir.path(), 1)).unwrap();
    let mut cache = MeshCache::new();
    let mut coordinator = Coordinator::new(&mut pool);

    let handle = PendingHandle::new("cadmesh_missing");
    assert_eq!(coordinator.phase(&handle), None);
    assert!(matches!(
        coordinator.resolve(&handle, &mut cache),
        Err(TessError::UnknownHandle(_))
    ));
}
