use meterwise::{BarWidth, Duration, Engine, Entity, Precision, Reading, ReadingStore};
use std::path::Path;
use std::time::Instant;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const METERS: u64 = 10;
const GROUP: u64 = 1;

fn main() -> meterwise::Result<()> {
    env_logger::builder()
        .filter_module("lsm_tree", log::LevelFilter::Warn)
        .filter_module("fjall", log::LevelFilter::Info)
        .filter_module("meterwise", log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let path = Path::new(".meterwise");

    if path.try_exists()? {
        std::fs::remove_dir_all(path)?;
    }

    let store = ReadingStore::builder().cache_size_mib(128).open(path)?;

    let now = meterwise::timestamp();
    let origin = now - Duration::days(365);

    let start = Instant::now();

    {
        use rand::Rng;

        let mut rng = rand::thread_rng();

        for meter in 0..METERS {
            let mut readings = vec![];
            let mut ts = origin;

            while ts < now {
                // Mostly quarter-hourly, sometimes a whole day in one reading
                let len = if rng.gen_bool(0.01) {
                    Duration::days(1)
                } else {
                    Duration::minutes(15)
                };

                // Base load with some random variation, more during the day
                let hour = (ts / Duration::hours(1)) % 24;
                let kw = if (7..22).contains(&hour) { 1.5 } else { 0.4 };
                let kw = (kw + rng.gen_range(-0.3..0.3_f64)).max(0.0);

                #[allow(clippy::cast_precision_loss)]
                let quantity = kw * len as f64 / Duration::hours(1) as f64;

                readings.push(Reading::new(meter, quantity, ts, ts + len)?);

                // Leave a gap now and then
                ts += len;
                if rng.gen_bool(0.001) {
                    ts += Duration::hours(rng.gen_range(1..48));
                }
            }

            log::info!("[meter:{meter}] ingesting {} readings", readings.len());
            store.insert_all(readings)?;
        }
    }

    store.set_group(GROUP, 0..METERS)?;

    log::info!("ingested in {:?}", start.elapsed());

    let engine = Engine::new(&store, &store);
    let entities = [Entity::Meter(0), Entity::Meter(1), Entity::Group(GROUP)];

    for _ in 0..3 {
        let start = Instant::now();

        let series = engine
            .compressed(&entities)
            .start(origin)
            .end(now)
            .run()?
            .collect()?;

        log::info!("compressed done in {:?}", start.elapsed());
        for (entity, buckets) in &series {
            log::info!("{entity}: {} points, first {:?}", buckets.len(), buckets.first());
        }
    }

    {
        let start = Instant::now();

        let bars = engine
            .bars(&entities, BarWidth::Precision(Precision::Week))
            .start(now - Duration::weeks(8))
            .run()?
            .collect()?;

        log::info!("bars done in {:?}", start.elapsed());
        log::info!("weekly totals of {}: {:#?}", Entity::Group(GROUP), bars[&Entity::Group(GROUP)]);
    }

    {
        let start = Instant::now();

        let comparison = engine
            .compare(&entities, now - Duration::days(1), Duration::weeks(1))
            .run()?
            .collect()?;

        log::info!("compare done in {:?}", start.elapsed());
        log::info!("compare result: {comparison:#?}");
    }

    {
        let start = Instant::now();

        let rollup = engine
            .rollup(&[Entity::Meter(0)], Precision::Day)
            .start(now - Duration::days(7))
            .run()?
            .collect()?;

        log::info!("rollup done in {:?}", start.elapsed());
        log::info!("daily rates of meter:0: {:#?}", rollup[&Entity::Meter(0)]);
    }

    Ok(())
}
