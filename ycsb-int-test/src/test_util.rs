use rand::{Rng, SeedableRng};
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use ycsb::{Db, ErrorKind, FieldMap, FieldSet, Properties, Status, YcsbError, YcsbResult};
use ycsb_mongodb::{ConnectionRegistry, ConnectionSet, Endpoint, InMemoryEndpoint, MongoDbClient};

pub const TABLE: &str = "usertable";

/// Runs a test with retry logic and error handling.
/// Tests run on the current thread so panics surface with their own message.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> YcsbResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> YcsbResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> YcsbResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => match after(ctx) {
                        Ok(_) => Ok(()),
                        Err(e) => Err((format!("After run failed: {:?}", e), backtrace.to_string())),
                    },
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();

        match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => {
                last_error = Some(e.clone());
                last_backtrace = Some(bt);
                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("Error: {}", e);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                last_error = Some(format!("Panic: {}", err_msg));
                last_backtrace = Some(Backtrace::capture().to_string());

                if attempt < MAX_RETRIES {
                    eprintln!(
                        "\n========== Test Attempt {}/{} Panicked (took {:?}) ==========",
                        attempt, MAX_RETRIES, elapsed
                    );
                    eprintln!("{}", err_msg);
                    thread::sleep(Duration::from_millis(100 * attempt as u64));
                }
            }
        }
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

/// A fresh registry over in-process endpoints, isolated from every other
/// test and from the process-wide registry.
#[derive(Clone)]
pub struct TestContext {
    registry: ConnectionRegistry,
    endpoints: Vec<Arc<InMemoryEndpoint>>,
    properties: Properties,
    connects: Arc<AtomicUsize>,
}

impl TestContext {
    pub fn new(endpoint_count: usize, properties: Properties) -> Self {
        let endpoints: Vec<Arc<InMemoryEndpoint>> = (0..endpoint_count)
            .map(|i| Arc::new(InMemoryEndpoint::new(format!("memory://node{}", i))))
            .collect();
        let connects = Arc::new(AtomicUsize::new(0));

        let handed_out = endpoints.clone();
        let counter = connects.clone();
        let registry = ConnectionRegistry::with_connector(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ConnectionSet::new(
                handed_out
                    .iter()
                    .map(|endpoint| endpoint.clone() as Arc<dyn Endpoint>)
                    .collect(),
            )
        });

        TestContext {
            registry,
            endpoints,
            properties,
            connects,
        }
    }

    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    pub fn endpoints(&self) -> &[Arc<InMemoryEndpoint>] {
        &self.endpoints
    }

    pub fn endpoint(&self, index: usize) -> Arc<InMemoryEndpoint> {
        self.endpoints[index].clone()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// How many times the registry opened its connection set.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Documents stored in `table` across every endpoint.
    pub fn document_count(&self, table: &str) -> usize {
        self.endpoints.iter().map(|e| e.document_count(table)).sum()
    }

    pub fn client(&self) -> MongoDbClient {
        MongoDbClient::with_registry(self.registry(), self.properties.clone())
    }

    pub fn initialized_client(&self) -> YcsbResult<MongoDbClient> {
        let mut client = self.client();
        client.init()?;
        if client.is_initialized() {
            Ok(client)
        } else {
            Err(YcsbError::new(
                "Test client did not initialize",
                ErrorKind::NotInitialized,
            ))
        }
    }
}

pub fn create_test_context() -> YcsbResult<TestContext> {
    Ok(TestContext::new(1, Properties::new()))
}

pub fn create_multi_endpoint_context() -> YcsbResult<TestContext> {
    Ok(TestContext::new(3, Properties::new()))
}

pub fn create_batch_context() -> YcsbResult<TestContext> {
    Ok(TestContext::new(2, Properties::new().with("batchsize", "4")))
}

pub fn cleanup(ctx: TestContext) -> YcsbResult<()> {
    if ctx.registry.init_count() != 0 {
        eprintln!(
            "Warning: {} registry reference(s) still held after test",
            ctx.registry.init_count()
        );
    }
    for endpoint in ctx.endpoints() {
        endpoint.close()?;
    }
    Ok(())
}

/// Key written by worker `thread_id` for its `index`-th record.
pub fn load_key(thread_id: usize, index: usize) -> String {
    format!("user{:02}{:08}", thread_id, index)
}

/// Loads `records_per_thread` records from each of `threads` workers.
///
/// Every worker runs its own client and cleans it up when done. Once the
/// last worker releases the registry the endpoints close, so callers that
/// keep using the data must hold an initialized client across the load.
/// Returns the number of failed inserts.
pub fn load_records(
    ctx: &TestContext,
    threads: usize,
    records_per_thread: usize,
) -> YcsbResult<usize> {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|thread_id| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            thread::spawn(move || -> YcsbResult<usize> {
                let mut client = ctx.initialized_client()?;
                let values = random_record(thread_id as u64, 10, 100);
                barrier.wait();

                let mut failed = 0;
                for i in 0..records_per_thread {
                    if client.insert(TABLE, &load_key(thread_id, i), &values) != Status::Ok {
                        failed += 1;
                    }
                }
                client.cleanup()?;
                Ok(failed)
            })
        })
        .collect();

    let mut failed = 0;
    for handle in handles {
        failed += handle.join().unwrap_or(Ok(records_per_thread))?;
    }
    Ok(failed)
}

pub fn random_key() -> String {
    format!("user{}", uuid::Uuid::new_v4().simple())
}

pub fn record(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
        .collect()
}

pub fn random_record(seed: u64, field_count: usize, field_len: usize) -> FieldMap {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..field_count)
        .map(|i| {
            let value: Vec<u8> = (0..field_len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
            (format!("field{}", i), value)
        })
        .collect()
}

pub fn field_set(names: &[&str]) -> FieldSet {
    names.iter().map(|name| name.to_string()).collect()
}
