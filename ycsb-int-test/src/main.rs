use std::time::Instant;
use ycsb::{Db, FieldMap, Status, YcsbResult};
use ycsb_int_test::test_util::{cleanup, create_test_context, load_key, load_records, TABLE};

fn main() -> YcsbResult<()> {
    colog::init();
    println!("Starting load test...");
    let ctx = create_test_context()?;

    let threads = 8;
    let records_per_thread = 25_000;

    // keeps the registry reference, and with it the endpoints, across both phases
    let mut client = ctx.initialized_client()?;

    let start = Instant::now();
    let failed = load_records(&ctx, threads, records_per_thread)?;
    println!(
        "Inserted {} records ({} failed) in {:?}",
        threads * records_per_thread,
        failed,
        start.elapsed()
    );

    let start = Instant::now();
    let mut result = FieldMap::new();
    let mut misses = 0;
    for i in 0..records_per_thread {
        if client.read(TABLE, &load_key(0, i), None, &mut result) != Status::Ok {
            misses += 1;
        }
    }
    println!("Read {} records ({} missed) in {:?}", records_per_thread, misses, start.elapsed());

    let start = Instant::now();
    let mut rows = Vec::new();
    let status = client.scan(TABLE, &load_key(3, 0), 1_000, None, &mut rows);
    println!("Scanned {} records ({}) in {:?}", rows.len(), status, start.elapsed());

    client.cleanup()?;
    cleanup(ctx)
}
