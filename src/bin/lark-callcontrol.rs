use lark_callcontrol::server::Server;

#[tokio::main]
async fn main() {
    lark_log::init();
    match Server::new() {
        Ok(server) => {
            let _ = server.run().await;
        }
        Err(err) => {
            eprintln!("can't start the call control server: {err:?}");
        }
    }
}
