use spatial_index::Geometry;
use spatial_index_int_test::test_util::{
    brute_force_intersecting, cleanup, create_buffered_context, create_memory_context,
    random_geometries, run_test,
};
use std::sync::{Arc, Barrier, RwLock};
use std::thread;

#[test]
fn test_concurrent_queries() {
    run_test(
        create_buffered_context,
        |ctx| {
            let shapes = Arc::new(random_geometries(401, 1000, 1000.0));
            let mut index = ctx.small_node_index::<usize>()?;
            for (i, shape) in shapes.iter().enumerate() {
                index.add(shape.clone(), i)?;
            }
            let index = Arc::new(index);

            let num_threads = 6;
            let barrier = Arc::new(Barrier::new(num_threads));
            let mut handles = vec![];

            for thread_id in 0..num_threads {
                let index = Arc::clone(&index);
                let shapes = Arc::clone(&shapes);
                let barrier = Arc::clone(&barrier);

                handles.push(thread::spawn(move || {
                    barrier.wait();
                    for window in random_geometries(500 + thread_id as u64, 25, 1000.0) {
                        let mut actual: Vec<usize> = index
                            .intersects_with(&window)
                            .unwrap()
                            .iter()
                            .map(|d| *d.value())
                            .collect();
                        actual.sort_unstable();
                        assert_eq!(actual, brute_force_intersecting(&shapes, &window));
                        assert_eq!(index.nearest_neighbors(3, &window).unwrap().len(), 3);
                    }
                }));
            }

            for handle in handles {
                assert!(handle.join().is_ok());
            }

            match Arc::try_unwrap(index) {
                Ok(mut index) => index.dispose(),
                Err(_) => panic!("index still shared"),
            }
        },
        cleanup,
    )
}

#[test]
fn test_writer_with_concurrent_readers() {
    run_test(
        create_memory_context,
        |ctx| {
            let index = Arc::new(RwLock::new(ctx.small_node_index::<usize>()?));
            let writes = 400;

            let writer = {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for i in 0..writes {
                        let shape = Geometry::point((i % 20) as f64, (i / 20) as f64);
                        index.write().unwrap().add(shape, i).unwrap();
                    }
                })
            };

            let readers: Vec<_> = (0..3)
                .map(|_| {
                    let index = Arc::clone(&index);
                    thread::spawn(move || {
                        let mut last = 0;
                        for _ in 0..100 {
                            let guard = index.read().unwrap();
                            let count = guard.count().unwrap();
                            // Entries are only ever added
                            assert!(count >= last);
                            assert_eq!(guard.entries().unwrap().len() as u64, count);
                            last = count;
                        }
                    })
                })
                .collect();

            assert!(writer.join().is_ok());
            for reader in readers {
                assert!(reader.join().is_ok());
            }

            let mut index = index.write().unwrap();
            assert_eq!(index.count()?, writes as u64);
            assert!(index.is_index_valid()?);
            index.dispose()
        },
        cleanup,
    )
}
