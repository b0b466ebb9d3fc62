fn main() {
    etho_pipeline::cli::run();
}
