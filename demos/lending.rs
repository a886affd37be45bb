//! Runs a short lending session twice, once retiring records synchronously and once
//! asynchronously.
//!
//! ```text
//! cargo run --example lending
//! ```

use rcu_catalog::{thread_key, Catalog, Error, Mode};
use tracing::{info, Level};

fn list(catalog: &Catalog) {
    for record in catalog.list() {
        info!(%record, "listed");
    }
}

fn session(mode: Mode) -> Result<(), Error> {
    info!(?mode, "executing operations");
    let catalog = Catalog::new();

    catalog.add(102, "BOOK1", "xyz")?;
    catalog.add(114, "BOOK2", "zbc")?;
    list(&catalog);

    catalog.borrow(114, mode)?;
    if catalog.is_borrowed(114)? {
        info!("book 114 is borrowed");
    }

    catalog.add(119, "BOOK3", "rubini")?;
    list(&catalog);

    catalog.return_record(114, mode)?;
    if !catalog.is_borrowed(114)? {
        info!("book 114 is available");
    }

    catalog.delete(114, mode)?;
    list(&catalog);

    catalog.delete(119, mode)?;
    catalog.delete(102, mode)?;
    list(&catalog);

    let reclaimed = thread_key::get().barrier()?;
    info!(reclaimed, "queued records reclaimed");
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().with_max_level(Level::TRACE).init();

    session(Mode::Sync)?;
    session(Mode::Async)?;

    rcu_catalog::stats::print_stats();
    Ok(())
}
