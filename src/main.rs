use anyhow::{bail, Context};
use query_flow::config::EngineConfig;
use query_flow::logging::init_logging;
use query_flow::object::{ObjectDefinition, ObjectSchema};
use query_flow::options::{QueryOptions, UserData};
use query_flow::sql_compiler::SqlCompiler;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const DEFAULT_CONFIG: &str = "query_flow.json";

/// Load the config file named on the command line, falling back to the built-in demo.
fn load_config() -> EngineConfig {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    match EngineConfig::from_json_file(&path) {
        Ok(config) => {
            println!("loaded configuration from {}", path);
            config
        }
        Err(e) => {
            println!("{}, using built-in demo configuration", e);
            EngineConfig::default()
        }
    }
}

fn print_object(object: &ObjectSchema) {
    println!("\nobject `{}` on `{}`", object.id(), object.source_name());
    for field in &object.fields {
        let mut notes = Vec::new();
        if field.multilingual {
            notes.push("multilingual".to_string());
        }
        if !field.options.is_empty() {
            let options: Vec<_> = field.options.iter().map(|o| format!("{}={}", o.id, o.text)).collect();
            notes.push(format!("options [{}]", options.join(", ")));
        }
        if field.relation.is_some() {
            notes.push("relation".to_string());
        }
        println!("  {}  {:<10} {}", field.id, field.column_name, notes.join(", "));
    }
}

fn compile_line(compiler: &SqlCompiler, object: &ObjectSchema, user: &UserData, line: &str) -> anyhow::Result<()> {
    let options: QueryOptions = serde_json::from_str(line).context("query options must be a JSON object")?;

    let fetch = compiler.compile(object, &options, user)?;
    println!("\n[fetch]\n{}", fetch.sql);

    let count = compiler.compile_count(object, &options, user)?;
    println!("\n[count]\n{}\n", count.sql);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = load_config();
    init_logging(&config.log_filter, config.log_json);

    let Some(object) = config.objects.first() else {
        bail!("configuration defines no objects");
    };
    print_object(object);

    let user = UserData {
        username: std::env::var("USER").ok(),
        language_code: Some("en".to_string()),
    };
    let compiler = SqlCompiler::new();

    println!("\nenter query options as JSON, e.g. {{\"where\": {{\"glue\": \"and\", \"rules\": []}}, \"limit\": 10}}");
    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("query> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                if let Err(e) = compile_line(&compiler, object, &user, line) {
                    println!("error: {:#}", e);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
