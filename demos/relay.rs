use std::time::Duration;

use tokio::{net::TcpListener, sync::mpsc};
use wirebus::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EventKind)]
#[repr(u8)]
enum Kind {
    Chat = 1,
    Ping,
    Pong,
}

#[tokio::main]
async fn main() -> Result {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Client side: send a few events and wait for the answer to the ping
    let client = Channel::connect(addr, Config::default()).await?;
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel();
    client.bus().bind(Kind::Pong, move |e| {
        let _ = pong_tx.send(e.property("seq").map(str::to_owned));
    });

    // Server side: every inbound event goes to the global bus
    let (socket, peer) = listener.accept().await?;
    let server = Channel::new(Config::default());
    let global = GlobalBus::new();
    let hook = global.clone();
    server.bus().bind(Subscription::All, move |e| hook.hook(e.clone()));
    server.start(socket)?;
    println!("accepted {peer}");

    let mut console = Subscriber::new("console", &global);
    console.bind(Kind::Chat, |e: &Event| {
        println!("chat: {}", e.property("text").unwrap_or_default());
        true
    });

    // Answers on the second tick, to show a handler that isn't done yet
    let mut responder = Subscriber::new("responder", &global);
    let reply = server.clone();
    let mut seen = false;
    responder.bind(Kind::Ping, move |e: &Event| {
        if !seen {
            seen = true;
            return false;
        }
        seen = false;
        let mut pong = Event::new(Kind::Pong);
        if let Some(seq) = e.property("seq") {
            pong.set_property("seq", seq);
        }
        reply.send(pong);
        true
    });

    client.send(Event::new(Kind::Chat).with_property("text", "hello"));
    client.send(Event::new(Kind::Chat).with_property("text", "anyone there?"));
    client.send(Event::new(Kind::Ping).with_property("seq", 1));

    let mut tick = tokio::time::interval(Duration::from_millis(16));
    let pong = loop {
        tokio::select! {
            pong = pong_rx.recv() => break pong.flatten(),
            _ = tick.tick() => {
                global.update();
                console.process_events();
                let progress = responder.process_events();
                if progress == Progress::Pending {
                    println!("responder is still busy");
                }
            }
        }
    };
    println!("pong {}", pong.as_deref().unwrap_or("?"));

    client.stop();
    server.closed().await;
    global.shutdown();
    client.join().await?;
    server.join().await
}
