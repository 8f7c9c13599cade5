//! parley - terminal chat client
//!
//! ```bash
//! parley alice --server 127.0.0.1:50051
//! ```

fn main() -> anyhow::Result<()> {
    parley_client::cli::main()
}
