fn main() -> anyhow::Result<()> {
    tibuild::run()
}
