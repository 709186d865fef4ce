//! The same workload over memory, disk and buffered disk storage.

use spatial_index::{
    BufferedStorageManager, DiskStorageConfig, DiskStorageManager, EngineData, Geometry, RTree,
    RTreeConfig, Shape, SpatialEngine, SpatialError, SpatialIndex, SpatialResult, StorageManager,
};
use spatial_index_int_test::test_util::{
    brute_force_intersecting, brute_force_nearest, cleanup, create_buffered_context,
    create_disk_context, create_memory_context, random_geometries, random_path, run_test,
    TestContext,
};
use std::fs;
use std::ops::ControlFlow;
use std::sync::Arc;

fn mixed_workload(ctx: TestContext) -> SpatialResult<()> {
    let shapes = random_geometries(201, 1200, 1000.0);
    let mut index = ctx.small_node_index::<usize>()?;
    for (i, shape) in shapes.iter().enumerate() {
        index.add(shape.clone(), i)?;
    }
    for shape in shapes.iter().skip(1).step_by(4) {
        assert_eq!(index.delete(shape)?, 1);
    }
    assert!(index.is_index_valid()?);

    let live: Vec<Geometry> = shapes
        .iter()
        .enumerate()
        .map(|(i, s)| {
            if i % 4 == 1 {
                // Far outside every query
                Geometry::point(1e9, 1e9)
            } else {
                s.clone()
            }
        })
        .collect();

    for window in random_geometries(202, 20, 1000.0) {
        let mut actual: Vec<usize> = index
            .intersects_with(&window)?
            .iter()
            .map(|d| *d.value())
            .collect();
        actual.sort_unstable();
        assert_eq!(actual, brute_force_intersecting(&live, &window));

        let nearest: Vec<usize> = index
            .nearest_neighbors(5, &window)?
            .iter()
            .map(|d| *d.value())
            .collect();
        let expected: Vec<usize> = brute_force_nearest(&live, &window, 5)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(nearest, expected);
    }

    index.flush()?;
    index.dispose()
}

#[test]
fn test_memory_backend() {
    run_test(|| create_memory_context(), |ctx| mixed_workload(ctx), |ctx| cleanup(ctx))
}

#[test]
fn test_disk_backend() {
    run_test(|| create_disk_context(), |ctx| mixed_workload(ctx), |ctx| cleanup(ctx))
}

#[test]
fn test_buffered_backend() {
    run_test(
        || create_buffered_context(),
        |ctx| mixed_workload(ctx),
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_buffer_absorbs_repeated_reads() {
    let path = random_path();
    let disk: Arc<dyn StorageManager> = Arc::new(DiskStorageManager::create(&path).unwrap());
    let buffered = Arc::new(BufferedStorageManager::with_capacity(disk, 64));

    let mut index = SpatialIndex::<Geometry, usize>::new(buffered.clone()).unwrap();
    for i in 0..500 {
        index.add(Geometry::point(i as f64, i as f64), i).unwrap();
    }
    let before = buffered.stats();
    for _ in 0..20 {
        index
            .intersects_with(&Geometry::region(0.0, 0.0, 50.0, 50.0))
            .unwrap();
    }
    let after = buffered.stats();
    assert!(after.hits > before.hits);
    // Every node fits in the buffer
    assert_eq!(after.misses, before.misses);

    index.dispose().unwrap();
    assert_eq!(buffered.dirty_pages(), 0);
    drop(buffered);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_engine_survives_reopen() {
    let path = random_path();
    let shapes = random_geometries(301, 400, 100.0);

    let header_page = {
        let disk: Arc<dyn StorageManager> = Arc::new(DiskStorageManager::create(&path).unwrap());
        let storage: Arc<dyn StorageManager> =
            Arc::new(BufferedStorageManager::with_capacity(disk, 16));
        let config = RTreeConfig::new()
            .with_leaf_capacity(6)
            .with_index_capacity(6);
        let mut tree = RTree::create(storage, config).unwrap();
        for (i, shape) in shapes.iter().enumerate() {
            tree.insert_data(&shape.bounding_box(), i as u64).unwrap();
        }
        tree.flush().unwrap();
        tree.header_page()
    };

    let disk: Arc<dyn StorageManager> = Arc::new(DiskStorageManager::open(&path).unwrap());
    let tree = RTree::open(disk, header_page).unwrap();
    assert_eq!(tree.size(), shapes.len() as u64);
    assert!(tree.check_integrity().unwrap().is_valid);

    let window = Geometry::region(10.0, 10.0, 60.0, 40.0).bounding_box();
    let mut found = Vec::new();
    let mut collect = |data: &EngineData| -> SpatialResult<ControlFlow<()>> {
        found.push(data.id as usize);
        Ok(ControlFlow::Continue(()))
    };
    tree.intersects_with_query(&window, &mut collect).unwrap();
    found.sort_unstable();

    let expected: Vec<usize> = (0..shapes.len())
        .filter(|&i| shapes[i].bounding_box().intersects(&window))
        .collect();
    assert_eq!(found, expected);

    drop(tree);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_node_capacity_must_fit_disk_page() {
    let path = random_path();
    let config = DiskStorageConfig::new().with_page_size(512);
    let disk: Arc<dyn StorageManager> =
        Arc::new(DiskStorageManager::create_with_config(&path, config).unwrap());

    let too_wide = RTreeConfig::new()
        .with_leaf_capacity(8)
        .with_index_capacity(64);
    let result: SpatialResult<SpatialIndex<Geometry, usize>> =
        SpatialIndex::with_config(disk.clone(), too_wide);
    assert!(matches!(result, Err(SpatialError::InvalidConfig(_))));

    // Small enough nodes take the same workload without losing entries
    let fitting = RTreeConfig::new()
        .with_leaf_capacity(8)
        .with_index_capacity(8);
    let mut index: SpatialIndex<Geometry, usize> =
        SpatialIndex::with_config(disk.clone(), fitting).unwrap();
    for i in 0..500 {
        index.add(Geometry::point(i as f64, (i % 13) as f64), i).unwrap();
    }
    assert_eq!(index.count().unwrap(), 500);
    assert_eq!(index.entries().unwrap().len(), 500);
    assert!(index.is_index_valid().unwrap());

    index.dispose().unwrap();
    drop(disk);
    let _ = fs::remove_file(&path);
}
