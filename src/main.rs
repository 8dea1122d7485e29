#[actix_web::main]
async fn main() {
    if let Err(e) = listing_qa_lib::run().await {
        eprintln!("listing-qa: {}", e);
        std::process::exit(1);
    }
}
