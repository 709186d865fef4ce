//! Containment, intersection and full-scan queries.

use spatial_index::{visitor_fn, Geometry, IndexData, Query, SpatialIndex};
use spatial_index_int_test::test_util::{
    brute_force_contained, brute_force_intersecting, cleanup, create_memory_context,
    random_geometries, run_test,
};
use std::ops::ControlFlow;

fn positions(results: &[IndexData<'_, Geometry, usize>]) -> Vec<usize> {
    let mut values: Vec<usize> = results.iter().map(|d| *d.value()).collect();
    values.sort_unstable();
    values
}

fn populate(index: &mut SpatialIndex<Geometry, usize>, shapes: &[Geometry]) {
    for (i, shape) in shapes.iter().enumerate() {
        index.add(shape.clone(), i).unwrap();
    }
}

#[test]
fn test_foo_bar_baz() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<&str>()?;
            index.add(Geometry::region(0.0, 0.0, 10.0, 10.0), "foo")?;
            index.add(Geometry::region(20.0, 20.0, 30.0, 30.0), "bar")?;
            index.add(Geometry::region(5.0, 5.0, 15.0, 15.0), "baz")?;
            assert_eq!(index.count()?, 3);

            let mut hits: Vec<&str> = index
                .intersects_with(&Geometry::region(0.0, 0.0, 12.0, 12.0))?
                .iter()
                .map(|d| *d.value())
                .collect();
            hits.sort_unstable();
            assert_eq!(hits, vec!["baz", "foo"]);

            let inside = index.nearest_neighbors(1, &Geometry::point(21.0, 21.0))?;
            assert_eq!(inside.len(), 1);
            assert_eq!(*inside[0].value(), "bar");
            assert_eq!(inside[0].distance(), Some(0.0));

            let outside = index.nearest_neighbors(1, &Geometry::point(19.0, 19.0))?;
            assert_eq!(*outside[0].value(), "bar");
            assert!((outside[0].distance().unwrap() - 1.4142135623730951).abs() < 1e-9);

            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_intersection_matches_brute_force() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(11, 2000, 1000.0);
            let mut index = ctx.small_node_index::<usize>()?;
            populate(&mut index, &shapes);
            assert!(index.is_index_valid()?);

            let windows = random_geometries(12, 50, 1000.0);
            for window in &windows {
                let expected = brute_force_intersecting(&shapes, window);
                let actual = positions(&index.intersects_with(window)?);
                assert_eq!(actual, expected, "window {}", window);
            }
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_containment_matches_brute_force() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(21, 2000, 1000.0);
            let mut index = ctx.small_node_index::<usize>()?;
            populate(&mut index, &shapes);

            let windows = [
                Geometry::region(0.0, 0.0, 1000.0, 1000.0),
                Geometry::region(100.0, 100.0, 400.0, 300.0),
                Geometry::circle(500.0, 500.0, 200.0),
                Geometry::circle(0.0, 1000.0, 50.0),
            ];
            for window in &windows {
                let expected = brute_force_contained(&shapes, window);
                let actual = positions(&index.contains_what(window)?);
                assert_eq!(actual, expected, "window {}", window);
            }
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_exact_shape_refinement() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<&str>()?;
            // Bounding box reaches into the window, the disc does not
            index.add(Geometry::circle(11.0, 11.0, 1.2), "corner-disc")?;
            index.add(Geometry::point(10.0, 10.0), "edge-point")?;

            let window = Geometry::region(0.0, 0.0, 10.0, 10.0);
            let hits: Vec<&str> = index
                .intersects_with(&window)?
                .iter()
                .map(|d| *d.value())
                .collect();
            assert_eq!(hits, vec!["edge-point"]);

            // Boundary counts as inside
            let contained: Vec<&str> = index
                .contains_what(&window)?
                .iter()
                .map(|d| *d.value())
                .collect();
            assert_eq!(contained, vec!["edge-point"]);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_callback_and_sequence_agree() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(31, 500, 100.0);
            let mut index = ctx.small_node_index::<usize>()?;
            populate(&mut index, &shapes);
            let window = Geometry::region(20.0, 20.0, 70.0, 60.0);

            let mut streamed = Vec::new();
            index.visit_intersects_with(&window, |data| {
                streamed.push(*data.value());
                ControlFlow::Continue(())
            })?;
            streamed.sort_unstable();
            assert_eq!(streamed, positions(&index.intersects_with(&window)?));

            let mut contained = Vec::new();
            index.visit_contains_what(&window, |data| {
                contained.push(*data.value());
                ControlFlow::Continue(())
            })?;
            contained.sort_unstable();
            assert_eq!(contained, positions(&index.contains_what(&window)?));

            // The generic traversal sees the same thing
            let mut traversed = Vec::new();
            index.traverse(
                Query::IntersectsWith(&window),
                &mut visitor_fn(|data: IndexData<'_, Geometry, usize>| {
                    traversed.push(*data.value());
                    ControlFlow::Continue(())
                }),
            )?;
            traversed.sort_unstable();
            assert_eq!(traversed, streamed);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_early_termination() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(41, 300, 100.0);
            let mut index = ctx.small_node_index::<usize>()?;
            populate(&mut index, &shapes);

            let mut seen = 0;
            index.visit_intersects_with(&Geometry::region(0.0, 0.0, 100.0, 100.0), |_| {
                seen += 1;
                if seen == 5 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })?;
            assert_eq!(seen, 5);

            let mut scanned = 0;
            index.for_each(|_| {
                scanned += 1;
                ControlFlow::Break(())
            })?;
            assert_eq!(scanned, 1);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_full_scan() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let shapes = random_geometries(51, 400, 100.0);
            let mut index = ctx.small_node_index::<usize>()?;
            populate(&mut index, &shapes);

            let all: Vec<usize> = (0..shapes.len()).collect();
            assert_eq!(positions(&index.entries()?), all);

            let mut iterated: Vec<usize> = index.iter()?.map(|d| *d.value()).collect();
            iterated.sort_unstable();
            assert_eq!(iterated, all);

            let mut visited = Vec::new();
            index.for_each(|data| {
                assert_eq!(data.shape(), &shapes[*data.value()]);
                assert!(data.distance().is_none());
                visited.push(*data.value());
                ControlFlow::Continue(())
            })?;
            visited.sort_unstable();
            assert_eq!(visited, all);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_empty_index_queries() {
    run_test(
        || create_memory_context(),
        |ctx| {
            let mut index = ctx.index::<()>()?;
            let query = Geometry::region(0.0, 0.0, 1.0, 1.0);
            assert_eq!(index.count()?, 0);
            assert!(index.intersects_with(&query)?.is_empty());
            assert!(index.contains_what(&query)?.is_empty());
            assert!(index.nearest_neighbors(3, &query)?.is_empty());
            assert!(index.entries()?.is_empty());
            assert!(index.is_index_valid()?);
            index.dispose()
        },
        |ctx| cleanup(ctx),
    )
}
