//! parleyd - multi-room chat server
//!
//! ```bash
//! RUST_LOG=parleyd=debug parleyd --listen 127.0.0.1:50051
//! ```

fn main() -> anyhow::Result<()> {
    parleyd::cli::main()
}
