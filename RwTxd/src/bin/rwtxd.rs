fn main() -> anyhow::Result<()> {
    rwtxd::cli::run_cli()
}
