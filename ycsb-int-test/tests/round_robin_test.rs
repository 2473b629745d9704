use std::sync::{Arc, Barrier};
use std::thread;
use ycsb::{Db, Status};
use ycsb_int_test::test_util::{cleanup, create_multi_endpoint_context, record, run_test, TABLE};

#[ctor::ctor]
fn init() {
    colog::init();
}

#[test]
fn test_operations_cycle_through_endpoints() {
    run_test(
        create_multi_endpoint_context,
        |ctx| {
            let mut client = ctx.initialized_client()?;
            for i in 0..9 {
                let status = client.insert(TABLE, &format!("user{}", i), &record(&[("f", "v")]));
                assert_eq!(status, Status::Ok);
            }

            // user0, user3, user6 land on the first endpoint
            for (index, endpoint) in ctx.endpoints().iter().enumerate() {
                assert_eq!(endpoint.document_count(TABLE), 3);
                for round in 0..3 {
                    let key = format!("user{}", round * 3 + index);
                    assert!(endpoint.document(TABLE, &key).is_some(), "{} on node{}", key, index);
                }
            }

            client.cleanup()
        },
        cleanup,
    )
}

#[test]
fn test_every_operation_advances_the_cursor() {
    run_test(
        create_multi_endpoint_context,
        |ctx| {
            let mut client = ctx.initialized_client()?;
            let mut result = ycsb::FieldMap::new();

            client.insert(TABLE, "k", &record(&[("f", "v")]));
            client.read(TABLE, "k", None, &mut result);
            client.delete(TABLE, "k");

            let counts: Vec<u64> = ctx.endpoints().iter().map(|e| e.operations()).collect();
            assert_eq!(counts, vec![1, 1, 1]);

            client.cleanup()
        },
        cleanup,
    )
}

#[test]
fn test_clients_share_one_cursor() {
    run_test(
        create_multi_endpoint_context,
        |ctx| {
            let mut first = ctx.initialized_client()?;
            let mut second = ctx.initialized_client()?;

            first.delete(TABLE, "a");
            second.delete(TABLE, "b");
            first.delete(TABLE, "c");

            let counts: Vec<u64> = ctx.endpoints().iter().map(|e| e.operations()).collect();
            assert_eq!(counts, vec![1, 1, 1]);

            first.cleanup()?;
            second.cleanup()
        },
        cleanup,
    )
}

#[test]
fn test_concurrent_operations_spread_uniformly() {
    run_test(
        create_multi_endpoint_context,
        |ctx| {
            let threads = 6;
            let per_thread = 50;
            let barrier = Arc::new(Barrier::new(threads));

            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let ctx = ctx.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        let mut client = ctx.initialized_client()?;
                        barrier.wait();
                        for i in 0..per_thread {
                            client.delete(TABLE, &format!("user{}", i));
                        }
                        client.cleanup()
                    })
                })
                .collect();

            for handle in handles {
                handle.join().expect("worker panicked")?;
            }

            let total = (threads * per_thread) as u64;
            for endpoint in ctx.endpoints() {
                assert_eq!(endpoint.operations(), total / 3);
            }
            Ok(())
        },
        cleanup,
    )
}
