#[rocket::launch]
fn rocket() -> _ {
    let rocket = vidtube_api::rocket();
    log::info!("Starting VidTube API Server");
    rocket
}
