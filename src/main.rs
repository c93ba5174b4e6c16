mod tutor;

use std::io::{BufRead, Write};
use std::sync::Arc;

use dotenv::dotenv;

use tutor::concepts::{ConceptChecker, SynonymTable};
use tutor::dialogue::{DialogueEngine, SubmitOutcome, TutorSession, MODULE_COMPLETE};
use tutor::loader::ModuleLoader;

fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting tutor session...");

    let modules_dir = std::env::var("MODULES_DIR").unwrap_or_else(|_| "modules".to_string());
    let concepts_file =
        std::env::var("CONCEPTS_FILE").unwrap_or_else(|_| "data/bio_concepts.json".to_string());

    let mut loader = ModuleLoader::new(&modules_dir);

    // A missing synonym table is not fatal; matching just loses its variants.
    let table = match std::fs::read_to_string(&concepts_file) {
        Ok(text) => SynonymTable::from_json(&text).unwrap_or_else(|e| {
            log::warn!("unreadable synonym table {}: {}", concepts_file, e);
            SynonymTable::default()
        }),
        Err(e) => {
            log::warn!("no synonym table at {}: {}", concepts_file, e);
            SynonymTable::default()
        }
    };
    let checker = Arc::new(ConceptChecker::new(table));

    let module_id = match std::env::args().nth(1) {
        Some(id) => id,
        None => {
            eprintln!("Usage: biotutor <module-id>");
            let available = loader.list_modules();
            if !available.is_empty() {
                eprintln!("Available modules in {}: {}", modules_dir, available.join(", "));
            }
            std::process::exit(2);
        }
    };

    let bundle = match loader.load_bundle(&module_id) {
        Ok(b) => b,
        Err(e) => {
            log::error!("module {} failed to load: {}", module_id, e);
            eprintln!("Error loading module {}: {}", module_id, e);
            std::process::exit(1);
        }
    };
    let specs = loader.load_specs(&module_id);

    print!("Your name: ");
    let _ = std::io::stdout().flush();
    let mut name = String::new();
    let _ = std::io::stdin().read_line(&mut name);
    let name = name.trim();
    let student = if name.is_empty() { "Student" } else { name };

    let mut session = TutorSession::new(
        student,
        bundle.clone(),
        specs,
        checker,
        DialogueEngine::new(),
    );

    println!("\nWelcome, {}! You selected {}.", session.student(), bundle.title);
    println!("Your answers aren't graded; the tutor helps you think deeper.");
    println!("Commands: /skip  /bonus  /quit\n");
    println!(
        "First question:\n{}\n",
        session.current_question().unwrap_or_default()
    );

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" => {
                if let Some(snap) = session.snapshot() {
                    log::info!(
                        "leaving session at {}",
                        serde_json::to_string(&snap).unwrap_or_default()
                    );
                }
                println!("Bye!");
                return;
            }
            "/bonus" => match session.bundle().bonus_question() {
                Some(b) => println!("Bonus question: {}\n", b),
                None => println!("No bonus question found.\n"),
            },
            "/skip" => match session.skip() {
                Some(q) => println!("No problem, we'll move on for now.\n\n{}\n", q),
                None => {
                    println!("{}", MODULE_COMPLETE);
                    return;
                }
            },
            answer => match session.submit(answer) {
                SubmitOutcome::Followup(msg) => println!("{}\n", msg),
                SubmitOutcome::Advanced {
                    message,
                    next_question,
                } => {
                    println!("{}", message);
                    match next_question {
                        Some(q) => println!("\n{}\n", q),
                        None => {
                            println!("{}", MODULE_COMPLETE);
                            return;
                        }
                    }
                }
            },
        }
    }
}
