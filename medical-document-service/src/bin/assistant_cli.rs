use medical_document_service::{ServiceConfig, build_assistant};
use review_flow::{Choice, ConversationSession, Speaker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

fn print_new_entries(session: &ConversationSession, shown: &mut usize) {
    for entry in session.transcript.iter().skip(*shown) {
        let speaker = match entry.speaker {
            Speaker::Ai => "assistant",
            Speaker::User => "you",
        };
        println!("[{}] {}", speaker, entry.text);
    }
    *shown = session.transcript.len();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("warn").init();

    let config = ServiceConfig::from_env()?;
    let engine = build_assistant(&config).await?;
    let mut session = engine.create().await;
    let mut shown = 0;

    println!("Answer with y/n, 'restart' to start over, 'quit' to leave.");
    print_new_entries(&session, &mut shown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim().to_ascii_lowercase();
        let choice = match input.as_str() {
            "quit" | "q" => break,
            "restart" => {
                session = engine.start(&session.id).await;
                shown = 0;
                print_new_entries(&session, &mut shown);
                continue;
            }
            answer => match answer.parse::<Choice>() {
                Ok(choice) => choice,
                Err(_) => {
                    println!("Please answer y or n.");
                    continue;
                }
            },
        };

        match engine.answer(&session.id, choice).await {
            Ok(turn) => {
                turn.finished().await;
            }
            Err(e) => {
                warn!("{}", e);
                println!("{}", e);
                continue;
            }
        }

        session = engine.snapshot(&session.id).await?;
        print_new_entries(&session, &mut shown);

        if let Some(document) = &session.final_document {
            println!("\n{}", document.documentation);
            break;
        }
        if let Some(error) = &session.error {
            println!("Assistant failed: {}", error);
            break;
        }
    }

    Ok(())
}
