//! Add, delete and dispose behaviour.

use spatial_index::{
    Geometry, IndexState, RTree, RTreeConfig, SpatialEngine, SpatialError, SpatialIndex,
};
use spatial_index_int_test::test_util::{
    cleanup, create_memory_context, random_geometries, run_test,
};
use std::ops::ControlFlow;
use std::sync::Arc;

#[test]
fn test_count_tracks_adds_and_deletes() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(101, 600, 1000.0);
            let mut index = ctx.small_node_index::<usize>()?;
            for (i, shape) in shapes.iter().enumerate() {
                index.add(shape.clone(), i)?;
                assert_eq!(index.count()?, i as u64 + 1);
            }

            let mut expected = shapes.len() as u64;
            for shape in shapes.iter().step_by(3) {
                assert_eq!(index.delete(shape)?, 1);
                expected -= 1;
                assert_eq!(index.count()?, expected);
            }
            assert!(index.is_index_valid()?);

            // Whatever remains is still found
            for (i, shape) in shapes.iter().enumerate() {
                let present = index
                    .intersects_with(shape)?
                    .iter()
                    .any(|d| *d.value() == i);
                assert_eq!(present, i % 3 != 0, "entry {}", i);
            }
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_everything() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(111, 300, 100.0);
            let mut index = ctx.small_node_index::<usize>()?;
            for (i, shape) in shapes.iter().enumerate() {
                index.add(shape.clone(), i)?;
            }
            for shape in &shapes {
                index.delete(shape)?;
            }
            assert_eq!(index.count()?, 0);
            assert!(index.entries()?.is_empty());
            assert_eq!(index.stats()?.height, 0);
            assert!(index.is_index_valid()?);

            // Usable again afterwards
            index.add(Geometry::point(1.0, 1.0), 0)?;
            assert_eq!(index.count()?, 1);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_delete_missing_shape_is_noop() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<&str>()?;
            index.add(Geometry::region(0.0, 0.0, 2.0, 2.0), "square")?;

            assert_eq!(index.delete(&Geometry::point(1.0, 1.0))?, 0);
            assert_eq!(index.delete(&Geometry::circle(1.0, 1.0, 1.0))?, 0);
            assert_eq!(index.delete(&Geometry::region(0.0, 0.0, 2.0, 2.1))?, 0);
            assert_eq!(index.count()?, 1);

            assert_eq!(index.delete(&Geometry::region(0.0, 0.0, 2.0, 2.0))?, 1);
            assert_eq!(index.delete(&Geometry::region(0.0, 0.0, 2.0, 2.0))?, 0);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_duplicates_are_independent_entries() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<String>()?;
            let shape = Geometry::circle(3.0, 3.0, 1.0);
            index.add(shape.clone(), "one".to_string())?;
            index.add(shape.clone(), "two".to_string())?;
            index.add(Geometry::point(3.0, 3.0), "center".to_string())?;
            assert_eq!(index.count()?, 3);

            let mut values: Vec<String> = index
                .contains_what(&Geometry::region(0.0, 0.0, 10.0, 10.0))?
                .iter()
                .map(|d| d.value().clone())
                .collect();
            values.sort();
            assert_eq!(values, vec!["center", "one", "two"]);

            assert_eq!(index.delete(&shape)?, 2);
            assert_eq!(index.count()?, 1);
            let remaining = index.entries()?;
            assert_eq!(remaining[0].value(), "center");
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_dispose_rejects_every_operation() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<u32>()?;
            index.add(Geometry::point(0.0, 0.0), 1)?;
            index.dispose()?;
            assert_eq!(index.state(), IndexState::Disposed);

            let query = Geometry::point(0.0, 0.0);
            let errors = vec![
                index.add(query.clone(), 2).unwrap_err(),
                index.delete(&query).unwrap_err(),
                index.count().unwrap_err(),
                index.dimensions().unwrap_err(),
                index.contains_what(&query).unwrap_err(),
                index.intersects_with(&query).unwrap_err(),
                index.nearest_neighbors(1, &query).unwrap_err(),
                index
                    .visit_intersects_with(&query, |_| ControlFlow::Continue(()))
                    .unwrap_err(),
                index.for_each(|_| ControlFlow::Continue(())).unwrap_err(),
                index.iter().unwrap_err(),
                index.stats().unwrap_err(),
                index.is_index_valid().unwrap_err(),
                index.flush().unwrap_err(),
            ];
            for error in errors {
                assert!(matches!(error, SpatialError::ObjectDisposed), "{:?}", error);
            }

            // Idempotent
            index.dispose()?;
            assert!(index.is_disposed());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_dispose_leaves_storage_usable() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut first = ctx.index::<u32>()?;
            first.add(Geometry::point(1.0, 1.0), 1)?;
            let pages = ctx.storage().page_count();
            first.dispose()?;
            assert!(Arc::ptr_eq(first.storage_manager(), &ctx.storage()));
            assert_eq!(ctx.storage().page_count(), pages);

            // Same storage manager, new index
            let mut second = ctx.index::<u32>()?;
            second.add(Geometry::point(2.0, 2.0), 2)?;
            assert_eq!(second.count()?, 1);
            second.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_drop_without_dispose() {
    run_test(
        || create_memory_context(),
        |ctx| {
            {
                let mut index = ctx.index::<u32>()?;
                index.add(Geometry::point(1.0, 1.0), 1)?;
            }
            // Storage manager still works after the index is gone
            let mut index = ctx.index::<u32>()?;
            index.add(Geometry::point(1.0, 1.0), 1)?;
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_custom_engine_factory() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index: SpatialIndex<Geometry, u32> =
                SpatialIndex::with_engine(ctx.storage(), |storage| {
                    let tree = RTree::create(storage, RTreeConfig::new().with_leaf_capacity(8))?;
                    let engine: Box<dyn SpatialEngine> = Box::new(tree);
                    Ok(engine)
                })?;
            for i in 0..50 {
                index.add(Geometry::point(i as f64, 0.0), i)?;
            }
            let stats = index.stats()?;
            assert_eq!(stats.leaf_capacity, 8);
            assert_eq!(stats.entries, 50);
            assert!(stats.height >= 2);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}
