use std::io::Write as _;

use chat_stream_worker::init_observability;
use chat_stream_worker::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), WorkerError> {
    let _ = dotenvy::dotenv();
    init_observability();

    let config = ClientConfig::from_env()?;
    let worker = Worker::http(&config)?;

    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let prompt = if prompt.trim().is_empty() {
        "Stream a short greeting.".to_string()
    } else {
        prompt
    };

    let request = TaskRequest::from_config(
        TaskId::generate(),
        &config,
        vec![
            ChatMessage::system("You are a concise assistant."),
            ChatMessage::user(prompt),
        ],
    );
    let mut task = worker.start(request)?;

    let mut printed = 0;
    while let Some(event) = task.next_event().await {
        match event {
            TaskEvent::Progress { text, .. } => {
                print!("{}", &text[printed..]);
                printed = text.len();
                let _ = std::io::stdout().flush();
            }
            TaskEvent::ParseError { error, .. } => eprintln!("\n[warn] {error}"),
            TaskEvent::Completed { .. } => println!(),
            TaskEvent::Failed { error, .. } => eprintln!("run error: {error}"),
        }
    }
    Ok(())
}
