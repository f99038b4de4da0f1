mod config;
mod error;
mod history;
mod matching;
mod merge;
mod messages;
mod presence;
mod room;
mod server;

use log::info;
use warp::Filter;

use config::Config;
use server::Relay;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = Config::from_env();
    let port = config.port;

    let relay = Relay::new(config);
    relay.spawn_idle_sweep();

    let ws_relay = relay.clone();
    let ws_route = warp::path("ws")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let relay = ws_relay.clone();
            ws.on_upgrade(move |socket| async move {
                relay.handle_connection(socket).await;
            })
        });

    let health = warp::path("health").and(warp::get()).map(|| "ok");

    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST"])
        .allow_credentials(true);

    let routes = ws_route.or(health).with(cors);

    info!("relay listening on port {port}");
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}
