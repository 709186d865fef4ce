use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_index::{
    BufferedStorageManager, DiskStorageManager, Geometry, MemoryStorageManager, RTreeConfig,
    Shape, SpatialIndex, SpatialResult, StorageManager,
};
use std::backtrace::Backtrace;
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, fs, thread};

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread; `after` runs even when the test fails.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> SpatialResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> SpatialResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 2;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        let (error, backtrace) = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => (e, bt),
            Err(panic_err) => {
                let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                (format!("Panic: {}", msg), Backtrace::capture().to_string())
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", error);
            thread::sleep(Duration::from_millis(50 * attempt as u64));
        }
        last_error = Some(error);
        last_backtrace = Some(backtrace);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A storage manager plus the file backing it, if any.
#[derive(Clone)]
pub struct TestContext {
    path: Option<String>,
    storage: Arc<dyn StorageManager>,
}

impl TestContext {
    pub fn new(path: Option<String>, storage: Arc<dyn StorageManager>) -> Self {
        Self { path, storage }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn storage(&self) -> Arc<dyn StorageManager> {
        self.storage.clone()
    }

    /// A fresh index over this context's storage, with default capacities.
    pub fn index<V>(&self) -> SpatialResult<SpatialIndex<Geometry, V>> {
        SpatialIndex::new(self.storage())
    }

    /// A fresh index with small nodes, so even modest data sets build deep
    /// trees.
    pub fn small_node_index<V>(&self) -> SpatialResult<SpatialIndex<Geometry, V>> {
        SpatialIndex::with_config(
            self.storage(),
            RTreeConfig::new()
                .with_leaf_capacity(4)
                .with_index_capacity(4),
        )
    }
}

pub fn random_path() -> String {
    let id = uuid::Uuid::new_v4();
    let temp_dir = env::temp_dir();
    temp_dir
        .join(format!("{}.idx", id))
        .to_string_lossy()
        .into_owned()
}

pub fn create_memory_context() -> SpatialResult<TestContext> {
    Ok(TestContext::new(None, Arc::new(MemoryStorageManager::new())))
}

pub fn create_disk_context() -> SpatialResult<TestContext> {
    let path = random_path();
    let disk = DiskStorageManager::create(&path)?;
    Ok(TestContext::new(Some(path), Arc::new(disk)))
}

pub fn create_buffered_context() -> SpatialResult<TestContext> {
    let path = random_path();
    let disk: Arc<dyn StorageManager> = Arc::new(DiskStorageManager::create(&path)?);
    let buffered = BufferedStorageManager::with_capacity(disk, 8);
    Ok(TestContext::new(Some(path), Arc::new(buffered)))
}

pub fn cleanup(ctx: TestContext) -> SpatialResult<()> {
    ctx.storage().flush()?;
    if let Some(path) = ctx.path() {
        let _ = fs::remove_file(path);
    }
    Ok(())
}

/// Random points, regions and circles in `[0, extent]^2`, reproducible per
/// seed.
pub fn random_geometries(seed: u64, count: usize, extent: f64) -> Vec<Geometry> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let x = rng.random_range(0.0..extent);
            let y = rng.random_range(0.0..extent);
            match rng.random_range(0..3) {
                0 => Geometry::point(x, y),
                1 => {
                    let w = rng.random_range(0.0..extent / 20.0);
                    let h = rng.random_range(0.0..extent / 20.0);
                    Geometry::region(x, y, x + w, y + h)
                }
                _ => Geometry::circle(x, y, rng.random_range(0.0..extent / 40.0)),
            }
        })
        .collect()
}

/// Positions in `shapes` whose shape lies within `query`, ascending.
pub fn brute_force_contained(shapes: &[Geometry], query: &Geometry) -> Vec<usize> {
    (0..shapes.len())
        .filter(|&i| query.contains(&shapes[i]))
        .collect()
}

/// Positions in `shapes` whose shape intersects `query`, ascending.
pub fn brute_force_intersecting(shapes: &[Geometry], query: &Geometry) -> Vec<usize> {
    (0..shapes.len())
        .filter(|&i| query.intersects(&shapes[i]))
        .collect()
}

/// The `k` nearest positions with their distances, ordered by (distance,
/// position).
pub fn brute_force_nearest(shapes: &[Geometry], query: &Geometry, k: usize) -> Vec<(usize, f64)> {
    let mut ranked: Vec<(usize, f64)> = shapes
        .iter()
        .enumerate()
        .map(|(i, shape)| (i, shape.distance_to(query)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}
