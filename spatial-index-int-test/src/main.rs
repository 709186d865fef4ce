use spatial_index::{Geometry, SpatialResult};
use spatial_index_int_test::test_util::{cleanup, create_buffered_context, random_geometries};

fn main() -> SpatialResult<()> {
    colog::init();
    println!("Starting stress test...");
    let ctx = create_buffered_context()?;

    let count = 200_000;
    let shapes = random_geometries(7, count, 10_000.0);
    let mut index = ctx.index::<usize>()?;

    let start = std::time::Instant::now();
    for (i, shape) in shapes.iter().enumerate() {
        index.add(shape.clone(), i)?;
    }
    println!("Inserted {} entries in {:?}", count, start.elapsed());

    let start = std::time::Instant::now();
    let mut hits = 0;
    for i in 0..1000 {
        let x = (i % 100) as f64 * 100.0;
        let y = (i / 10) as f64 * 10.0;
        hits += index
            .intersects_with(&Geometry::region(x, y, x + 50.0, y + 50.0))?
            .len();
    }
    println!("1000 window queries ({} hits) in {:?}", hits, start.elapsed());

    let start = std::time::Instant::now();
    for i in 0..1000 {
        let query = Geometry::point((i * 7 % 10_000) as f64, (i * 13 % 10_000) as f64);
        index.nearest_neighbors(10, &query)?;
    }
    println!("1000 nearest-neighbor queries in {:?}", start.elapsed());

    let start = std::time::Instant::now();
    let mut removed = 0;
    for shape in shapes.iter().step_by(2) {
        removed += index.delete(shape)?;
    }
    println!("Removed {} entries in {:?}", removed, start.elapsed());
    println!("{}", index);

    index.dispose()?;
    cleanup(ctx)
}
