//! Honey.
//!
//! Honey is a request-coalescing HTTP reverse-proxy cache: it sits between
//! clients and an origin server, serves eligible responses from memory and
//! collapses concurrent misses for the same key into a single backend fetch.

fn main() {
    match honey::cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            honey::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
