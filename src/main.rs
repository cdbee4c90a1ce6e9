use clap::Parser;
use log::error;

use parallel_bucket_sort::{run_worker, Communicator, Config, Key};

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Runs the protocol on one worker. Any failure takes the whole group down, there is no partial
/// result to salvage.
fn worker(comm: &dyn Communicator, config: &Config) -> Option<Vec<Key>> {
    match run_worker(comm, config) {
        Ok(report) => report.collected,
        Err(e) => {
            error!("rank {}: {}", comm.rank(), e);
            comm.abort(e.exit_code())
        }
    }
}

fn print_sequence(sequence: &[Key]) {
    println!("{:?}", sequence);
}

#[cfg(not(feature = "mpi"))]
fn main() {
    use parallel_bucket_sort::LocalGroup;

    let config = Config::parse();
    init_logging(&config.log_level);

    let group = match config
        .validate(config.workers)
        .and_then(|_| LocalGroup::new(config.workers))
    {
        Ok(group) => group,
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    };

    match group.run(|comm| worker(&comm, &config)) {
        Ok(results) => {
            if let Some(sequence) = results.into_iter().flatten().next() {
                print_sequence(&sequence);
            }
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(parallel_bucket_sort::SortError::from(e).exit_code());
        }
    }
}

#[cfg(feature = "mpi")]
fn main() {
    use parallel_bucket_sort::comm::MpiComm;

    let config = Config::parse();
    init_logging(&config.log_level);

    let Some(universe) = mpi::initialize() else {
        error!("MPI was already initialized");
        std::process::exit(1);
    };
    let comm = MpiComm::new(universe.world());

    if let Some(sequence) = worker(&comm, &config) {
        print_sequence(&sequence);
    }
}
