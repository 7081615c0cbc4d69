//! `massconv <config.ini>`: convert every texture dictionary below a game directory.

fn main() -> anyhow::Result<()> {
    rwtxd::cli::run_massconv()
}
