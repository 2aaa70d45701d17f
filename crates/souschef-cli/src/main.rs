use std::fs;
use std::io::{self, BufRead, ErrorKind, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use souschef_contracts::chat::{parse_result_command, ResultAction, RESULT_HELP_COMMANDS};
use souschef_contracts::errors::GenerationError;
use souschef_contracts::history::HistoryCategory;
use souschef_contracts::preferences::{
    Mood, PassportRequest, PlanPreferences, PreferenceInput, TimeBudget, CHECKLIST_VOCABULARY,
};
use souschef_contracts::shopping::ShoppingList;
use souschef_engine::config::EngineConfig;
use souschef_engine::media::{decode_data_uri, prepare_pantry_image};
use souschef_engine::{FlowKind, Kitchen, PassportArtifact, PlanArtifact, RecipeArtifact};

const DEFAULT_SHOPPING_LIST: &str = "shopping-list.txt";
const DEFAULT_MEDIA_DIR: &str = "souschef-media";

#[derive(Debug, Parser)]
#[command(name = "souschef", version, about = "Recipe and meal-planning assistant")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Where storage.json, session.json and events.jsonl live.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// gemini or dryrun.
    #[arg(long, global = true)]
    provider: Option<String>,
    #[arg(long, global = true)]
    text_model: Option<String>,
    #[arg(long, global = true)]
    image_model: Option<String>,
    #[arg(long, global = true)]
    audio_model: Option<String>,
    #[arg(long, global = true)]
    embedding_model: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Suggest one recipe from what is in the kitchen.
    Recipe(RecipeArgs),
    /// Draft a weekly meal plan.
    Plan(PlanArgs),
    /// Recommend local dishes and a chef card for a trip.
    Passport(PassportArgs),
    /// Inspect or clear the seen-item history.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage the stored Gemini API key.
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Answer a challenge to unlock generation for this session.
    Verify,
}

#[derive(Debug, Args)]
struct ResultArgs {
    /// Print the result as JSON and exit.
    #[arg(long)]
    json: bool,
    /// Skip the interactive result prompt.
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Debug, Args)]
struct RecipeArgs {
    /// Mood number (1-8) or label, e.g. 1 or Cozy.
    #[arg(long, default_value = "1")]
    mood: String,
    /// 15, 30, 60 or long.
    #[arg(long, default_value = "30")]
    time: String,
    /// Checklist ingredients, comma separated or repeated.
    #[arg(long = "have", value_delimiter = ',')]
    have: Vec<String>,
    /// Other ingredients on hand, comma separated.
    #[arg(long, default_value = "")]
    ingredients: String,
    /// Ingredients to avoid, comma separated.
    #[arg(long, default_value = "")]
    avoid: String,
    /// Photo of the pantry or fridge.
    #[arg(long)]
    photo: Option<PathBuf>,
    #[command(flatten)]
    result: ResultArgs,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Dietary needs, comma separated.
    #[arg(long, default_value = "")]
    diet: String,
    /// Free-text wishes for the week.
    #[arg(long, default_value = "")]
    prefer: String,
    #[arg(long, default_value_t = 7)]
    days: u8,
    #[arg(long, default_value_t = 2)]
    servings: u8,
    #[command(flatten)]
    result: ResultArgs,
}

#[derive(Debug, Args)]
struct PassportArgs {
    #[arg(long)]
    destination: String,
    /// Dietary needs, comma separated.
    #[arg(long, default_value = "")]
    diet: String,
    /// Language for the chef card translation.
    #[arg(long)]
    language: Option<String>,
    #[command(flatten)]
    result: ResultArgs,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    /// List one category, or all of them.
    List { category: Option<String> },
    /// Clear one category, or `all`.
    Clear { category: String },
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    Set { key: String },
    Clear,
    /// Show where the active key comes from, masked.
    Show,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("souschef error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = build_config(&cli.global);
    match cli.command {
        Command::Recipe(args) => run_recipe(config, args),
        Command::Plan(args) => run_plan(config, args),
        Command::Passport(args) => run_passport(config, args),
        Command::History { action } => run_history(config, action),
        Command::Key { action } => run_key(config, action),
        Command::Verify => run_verify(config),
    }
}

fn build_config(global: &GlobalArgs) -> EngineConfig {
    let mut config = EngineConfig::from_env();
    if let Some(data_dir) = &global.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(provider) = &global.provider {
        let provider = provider.trim().to_ascii_lowercase();
        if provider == "dryrun" && std::env::var_os("SOUSCHEF_REQUIRE_VERIFICATION").is_none() {
            config.require_verification = false;
        }
        config.provider = provider;
    }
    let overrides = [
        (&global.text_model, &mut config.models.text),
        (&global.image_model, &mut config.models.image),
        (&global.audio_model, &mut config.models.audio),
        (&global.embedding_model, &mut config.models.embedding),
    ];
    for (requested, slot) in overrides {
        if let Some(model) = requested {
            *slot = Some(model.clone());
        }
    }
    config
}

/// A finished result as the prompt sees it.
enum ResultView {
    Recipe(RecipeArtifact),
    Plan(PlanArtifact),
    Passport(PassportArtifact),
}

impl ResultView {
    fn render(&self) -> String {
        match self {
            ResultView::Recipe(artifact) => render_recipe(artifact),
            ResultView::Plan(artifact) => render_plan(artifact),
            ResultView::Passport(artifact) => render_passport(artifact),
        }
    }

    fn to_json(&self) -> Result<String> {
        let text = match self {
            ResultView::Recipe(artifact) => serde_json::to_string_pretty(artifact)?,
            ResultView::Plan(artifact) => serde_json::to_string_pretty(artifact)?,
            ResultView::Passport(artifact) => serde_json::to_string_pretty(artifact)?,
        };
        Ok(text)
    }

    fn shopping_list(&self) -> Option<ShoppingList> {
        match self {
            ResultView::Recipe(artifact) => {
                Some(ShoppingList::from_items(artifact.shopping_list.clone()))
            }
            ResultView::Plan(artifact) => {
                Some(ShoppingList::from_items(artifact.shopping_list.clone()))
            }
            ResultView::Passport(_) => None,
        }
    }

    /// `(file stem, data URI)` for every piece of media in the result.
    fn media(&self) -> Vec<(String, String)> {
        match self {
            ResultView::Recipe(artifact) => artifact
                .image
                .iter()
                .map(|uri| (format!("recipe-{}", slug(&artifact.recipe.name)), uri.clone()))
                .collect(),
            ResultView::Plan(artifact) => artifact
                .image
                .iter()
                .map(|uri| (format!("plan-{}", slug(&artifact.plan.title)), uri.clone()))
                .collect(),
            ResultView::Passport(artifact) => {
                let mut media: Vec<(String, String)> = artifact
                    .recommendations
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, rec)| {
                        rec.image
                            .as_ref()
                            .map(|uri| {
                                let stem = format!("dish-{}-{}", idx + 1, slug(&rec.dish.name));
                                (stem, uri.clone())
                            })
                    })
                    .collect();
                if let Some(audio) = &artifact.audio {
                    media.push(("chef-card".to_string(), audio.clone()));
                }
                media
            }
        }
    }
}

fn run_recipe(config: EngineConfig, args: RecipeArgs) -> Result<i32> {
    let mut input = PreferenceInput::new(Mood::parse(&args.mood)?, TimeBudget::parse(&args.time)?);
    input
        .set_checklist(&args.have)
        .with_context(|| {
            format!("checklist ingredients are: {}", CHECKLIST_VOCABULARY.join(", "))
        })?;
    input.free_text = args.ingredients.clone();
    input.disliked = args.avoid.clone();
    if let Some(path) = &args.photo {
        input.image = Some(
            prepare_pantry_image(path)
                .with_context(|| format!("failed to load photo {}", path.display()))?,
        );
    }
    let mut kitchen = Kitchen::open(config)?;
    present(&mut kitchen, FlowKind::Recipe, &args.result, |kitchen| {
        kitchen.generate_recipe(&input).map(ResultView::Recipe)
    })
}

fn run_plan(config: EngineConfig, args: PlanArgs) -> Result<i32> {
    let preferences = PlanPreferences {
        dietary_needs: args.diet.clone(),
        preferences: args.prefer.clone(),
        days: args.days,
        servings: args.servings,
    };
    let mut kitchen = Kitchen::open(config)?;
    present(&mut kitchen, FlowKind::Plan, &args.result, |kitchen| {
        kitchen.generate_plan(&preferences).map(ResultView::Plan)
    })
}

fn run_passport(config: EngineConfig, args: PassportArgs) -> Result<i32> {
    let request = PassportRequest {
        destination: args.destination.clone(),
        dietary_needs: args.diet.clone(),
        language: args.language.clone(),
    };
    let mut kitchen = Kitchen::open(config)?;
    present(&mut kitchen, FlowKind::Passport, &args.result, |kitchen| {
        kitchen.generate_passport(&request).map(ResultView::Passport)
    })
}

fn print_warnings(kitchen: &mut Kitchen) {
    for warning in kitchen.take_warnings() {
        eprintln!("warning: {warning}");
    }
}

/// Generates and prints a result, then serves the result prompt until `quit`
/// or EOF. Only the first generation can fail the command.
fn present<F>(
    kitchen: &mut Kitchen,
    kind: FlowKind,
    args: &ResultArgs,
    mut generate: F,
) -> Result<i32>
where
    F: FnMut(&mut Kitchen) -> Result<ResultView, GenerationError>,
{
    let outcome = generate(kitchen);
    print_warnings(kitchen);
    let view = outcome.map_err(anyhow::Error::new)?;
    if args.json {
        println!("{}", view.to_json()?);
        return Ok(0);
    }
    println!("{}", view.render());
    if args.no_prompt || !io::stdin().is_terminal() {
        return Ok(0);
    }
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    serve_prompt(kitchen, kind, view, stdin.lock(), &mut stdout, generate)
}

fn serve_prompt<R, W, F>(
    kitchen: &mut Kitchen,
    kind: FlowKind,
    mut view: ResultView,
    mut input: R,
    out: &mut W,
    mut generate: F,
) -> Result<i32>
where
    R: BufRead,
    W: Write,
    F: FnMut(&mut Kitchen) -> Result<ResultView, GenerationError>,
{
    writeln!(out, "Type help for commands.")?;
    let mut line = String::new();
    loop {
        write!(out, "{}> ", kind.label())?;
        out.flush()?;
        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            return Ok(0);
        }

        let command = parse_result_command(line.trim_end_matches(['\n', '\r']));
        match command.action {
            ResultAction::Noop => {}
            ResultAction::Help => {
                for row in RESULT_HELP_COMMANDS {
                    writeln!(out, "  {row}")?;
                }
            }
            ResultAction::Show => writeln!(out, "{}", view.render())?,
            ResultAction::Another => {
                kitchen.reset_flow(kind);
                let outcome = generate(kitchen);
                print_warnings(kitchen);
                match outcome {
                    Ok(next) => {
                        view = next;
                        writeln!(out, "{}", view.render())?;
                    }
                    Err(err) => writeln!(
                        out,
                        "Could not generate another: {err}. The last result is still available."
                    )?,
                }
            }
            ResultAction::Download => {
                let Some(list) = view.shopping_list() else {
                    writeln!(out, "This result has no shopping list.")?;
                    continue;
                };
                let path = PathBuf::from(command.path.as_deref().unwrap_or(DEFAULT_SHOPPING_LIST));
                match list.write_to(&path) {
                    Ok(()) => writeln!(
                        out,
                        "Shopping list ({} items) written to {}",
                        list.len(),
                        path.display()
                    )?,
                    Err(err) => writeln!(out, "Download failed: {err:#}")?,
                }
            }
            ResultAction::SaveMedia => {
                let dir = PathBuf::from(command.path.as_deref().unwrap_or(DEFAULT_MEDIA_DIR));
                match save_media(&view.media(), &dir) {
                    Ok(written) if written.is_empty() => {
                        writeln!(out, "This result has no media to save.")?
                    }
                    Ok(written) => {
                        for path in written {
                            writeln!(out, "Saved {}", path.display())?;
                        }
                    }
                    Err(err) => writeln!(out, "Save failed: {err:#}")?,
                }
            }
            ResultAction::Quit => return Ok(0),
            ResultAction::Unknown => writeln!(
                out,
                "Unknown command '{}'. Type help for commands.",
                command.raw.trim()
            )?,
        }
    }
}

fn save_media(media: &[(String, String)], dir: &Path) -> Result<Vec<PathBuf>> {
    if media.is_empty() {
        return Ok(Vec::new());
    }
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut written = Vec::new();
    for (stem, uri) in media {
        let asset = decode_data_uri(uri)?;
        let path = dir.join(format!("{stem}.{}", asset.extension()));
        fs::write(&path, &asset.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn slug(text: &str) -> String {
    let mut out = String::new();
    for ch in text.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}

fn media_note(image: &Option<String>) -> &'static str {
    if image.is_some() {
        "image ready (save to keep it)"
    } else {
        "no image this time"
    }
}

fn render_recipe(artifact: &RecipeArtifact) -> String {
    let recipe = &artifact.recipe;
    let mut out = vec![format!("== {} ==", recipe.name)];
    if !recipe.description.trim().is_empty() {
        out.push(recipe.description.trim().to_string());
    }
    out.push(String::new());
    out.push("Ingredients:".to_string());
    out.extend(recipe.ingredients.iter().map(|item| format!("  - {item}")));
    out.push("Instructions:".to_string());
    out.extend(
        recipe
            .instructions
            .iter()
            .enumerate()
            .map(|(idx, step)| format!("  {}. {step}", idx + 1)),
    );
    if !recipe.nutrition.trim().is_empty() {
        out.push(format!("Nutrition: {}", recipe.nutrition.trim()));
    }
    if recipe.missing_ingredients.is_empty() {
        out.push("You have everything you need.".to_string());
    } else {
        out.push(format!("Missing: {}", recipe.missing_ingredients.join(", ")));
    }
    if let Some(quote) = &artifact.quote {
        let author = if quote.author.trim().is_empty() {
            "Unknown"
        } else {
            quote.author.trim()
        };
        out.push(format!("\n\"{}\" - {author}", quote.text.trim()));
    }
    out.push(format!("[{}]", media_note(&artifact.image)));
    out.join("\n")
}

fn render_plan(artifact: &PlanArtifact) -> String {
    let plan = &artifact.plan;
    let mut out = vec![format!("== {} ==", plan.title)];
    if !plan.summary.trim().is_empty() {
        out.push(plan.summary.trim().to_string());
    }
    for day in &plan.days {
        out.push(format!(
            "{}: breakfast {} | lunch {} | dinner {}",
            day.day, day.breakfast, day.lunch, day.dinner
        ));
    }
    if !artifact.shopping_list.is_empty() {
        out.push(format!("Shopping list: {}", artifact.shopping_list.join(", ")));
    }
    if !artifact.sources.is_empty() {
        let titles: Vec<&str> = artifact.sources.iter().map(|hit| hit.title.as_str()).collect();
        out.push(format!("Inspired by: {}", titles.join(", ")));
    }
    out.push(format!("[{}]", media_note(&artifact.image)));
    out.join("\n")
}

fn render_passport(artifact: &PassportArtifact) -> String {
    let mut out = vec![format!("== Culinary passport: {} ==", artifact.destination)];
    for (idx, rec) in artifact.recommendations.iter().enumerate() {
        let local = if rec.dish.local_name.trim().is_empty() {
            String::new()
        } else {
            format!(" ({})", rec.dish.local_name.trim())
        };
        out.push(format!("{}. {}{local}: {}", idx + 1, rec.dish.name, rec.dish.description));
        out.push(format!("   [{}]", media_note(&rec.image)));
    }
    let card = &artifact.chef_card;
    if !card.message.trim().is_empty() || !card.translation.trim().is_empty() {
        out.push(String::new());
        out.push("Chef card:".to_string());
        out.push(format!("  {}", card.message.trim()));
        if !card.translation.trim().is_empty() {
            let language = if card.language.trim().is_empty() {
                "translation"
            } else {
                card.language.trim()
            };
            out.push(format!("  {language}: {}", card.translation.trim()));
        }
        out.push(if artifact.audio.is_some() {
            "  [audio ready (save to keep it)]".to_string()
        } else {
            "  [no audio this time]".to_string()
        });
    }
    out.join("\n")
}

fn run_history(config: EngineConfig, action: HistoryAction) -> Result<i32> {
    let mut kitchen = Kitchen::open(config)?;
    match action {
        HistoryAction::List { category } => {
            for category in parse_categories(category.as_deref())? {
                let entries = kitchen.history(category);
                println!("{} ({}):", category.label(), entries.len());
                for entry in entries {
                    println!("  {entry}");
                }
            }
        }
        HistoryAction::Clear { category } => {
            for category in parse_categories(Some(&category))? {
                kitchen.clear_history(category)?;
                println!("Cleared {} history.", category.label());
            }
        }
    }
    Ok(0)
}

fn parse_categories(raw: Option<&str>) -> Result<Vec<HistoryCategory>> {
    match raw.map(str::trim) {
        None | Some("all") => Ok(HistoryCategory::ALL.to_vec()),
        Some(name) => match HistoryCategory::parse(name) {
            Some(category) => Ok(vec![category]),
            None => bail!(
                "unknown history category '{name}' (quotes, recipes, plans, passport or all)"
            ),
        },
    }
}

fn run_key(config: EngineConfig, action: KeyAction) -> Result<i32> {
    let mut kitchen = Kitchen::open(config)?;
    match action {
        KeyAction::Set { key } => {
            kitchen.set_api_key(&key)?;
            println!("API key saved.");
        }
        KeyAction::Clear => {
            kitchen.clear_api_key()?;
            println!("Stored API key removed.");
        }
        KeyAction::Show => {
            let source = if kitchen.has_stored_api_key() { "stored" } else { "environment" };
            match kitchen.api_key() {
                Some(key) => println!("{} ({source})", mask_key(&key)),
                None => println!("No API key configured. Run `souschef key set <KEY>`."),
            }
        }
    }
    Ok(0)
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

/// Two small addends drawn from a fresh UUID.
fn challenge_from_seed(seed: &[u8; 16]) -> (u32, u32) {
    (u32::from(seed[0] % 20) + 2, u32::from(seed[1] % 20) + 2)
}

fn check_answer(challenge: (u32, u32), answer: &str) -> bool {
    answer
        .trim()
        .parse::<u32>()
        .map(|value| value == challenge.0 + challenge.1)
        .unwrap_or(false)
}

fn run_verify(config: EngineConfig) -> Result<i32> {
    let mut kitchen = Kitchen::open(config)?;
    let challenge = challenge_from_seed(uuid::Uuid::new_v4().as_bytes());
    print!("What is {} + {}? ", challenge.0, challenge.1);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    if !check_answer(challenge, &answer) {
        println!("That is not right; try `souschef verify` again.");
        return Ok(1);
    }
    kitchen.mark_verified()?;
    println!("Verified. Generation stays unlocked while you keep using it.");
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_keeps_ascii_words() {
        assert_eq!(slug("Pastéis de Nata!"), "past-is-de-nata");
        assert_eq!(slug("  "), "item");
    }

    #[test]
    fn masks_all_but_last_four() {
        assert_eq!(mask_key("AIzaSyExample1234"), "*************1234");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn verification_answer_must_match_sum() {
        let challenge = challenge_from_seed(&[5, 30, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(challenge, (7, 12));
        assert!(check_answer(challenge, " 19\n"));
        assert!(!check_answer(challenge, "20"));
        assert!(!check_answer(challenge, "nineteen"));
    }

    #[test]
    fn categories_parse_with_all() -> Result<()> {
        assert_eq!(parse_categories(None)?.len(), 4);
        assert_eq!(parse_categories(Some("recipes"))?, vec![HistoryCategory::RecipeTitles]);
        assert!(parse_categories(Some("desserts")).is_err());
        Ok(())
    }

    #[test]
    fn save_media_writes_decoded_files() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let media = vec![("chef-card".to_string(), "data:audio/wav;base64,UklGRg==".to_string())];
        let written = save_media(&media, &temp.path().join("out"))?;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].file_name().and_then(|name| name.to_str()), Some("chef-card.wav"));
        assert_eq!(fs::read(&written[0])?, b"RIFF".to_vec());
        Ok(())
    }

    fn dryrun_kitchen(data_dir: &Path) -> Result<Kitchen> {
        Kitchen::open(EngineConfig {
            data_dir: data_dir.to_path_buf(),
            provider: "dryrun".to_string(),
            require_verification: false,
            retry_backoff: std::time::Duration::ZERO,
            ..EngineConfig::default()
        })
    }

    #[test]
    fn failed_another_keeps_the_prompt_and_last_result() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut kitchen = dryrun_kitchen(temp.path())?;
        let mut input = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        input.set_checklist(["Rice"])?;
        let first = kitchen.generate_recipe(&input)?;
        let name = first.recipe.name.clone();

        let mut calls = 0;
        let mut out = Vec::new();
        let code = serve_prompt(
            &mut kitchen,
            FlowKind::Recipe,
            ResultView::Recipe(first),
            "another\nshow\nquit\n".as_bytes(),
            &mut out,
            |_| {
                calls += 1;
                Err(GenerationError::Overloaded {
                    attempts: 1,
                    detail: "503".to_string(),
                })
            },
        )?;

        let printed = String::from_utf8(out)?;
        assert_eq!(code, 0);
        assert_eq!(calls, 1);
        assert!(printed.contains("Could not generate another"));
        assert!(printed.contains(&format!("== {name} ==")));
        assert!(printed.trim_end().ends_with("recipe>"));
        Ok(())
    }

    #[test]
    fn another_replaces_the_shown_result() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut kitchen = dryrun_kitchen(temp.path())?;
        let mut input = PreferenceInput::new(Mood::Cozy, TimeBudget::HalfHour);
        input.set_checklist(["Spinach"])?;
        let first = kitchen.generate_recipe(&input)?;
        let first_name = first.recipe.name.clone();

        let mut out = Vec::new();
        serve_prompt(
            &mut kitchen,
            FlowKind::Recipe,
            ResultView::Recipe(first),
            "again\n".as_bytes(),
            &mut out,
            |kitchen| kitchen.generate_recipe(&input).map(ResultView::Recipe),
        )?;

        let printed = String::from_utf8(out)?;
        assert!(!printed.contains(&format!("== {first_name} ==")));
        assert_eq!(kitchen.history(HistoryCategory::RecipeTitles).len(), 2);
        Ok(())
    }

    #[test]
    fn cli_parses_recipe_flags() -> Result<()> {
        let cli = Cli::try_parse_from([
            "souschef",
            "--provider",
            "dryrun",
            "recipe",
            "--mood",
            "Cozy",
            "--have",
            "Rice,Spinach",
            "--no-prompt",
        ])?;
        assert_eq!(cli.global.provider.as_deref(), Some("dryrun"));
        match cli.command {
            Command::Recipe(args) => {
                assert_eq!(args.have, vec!["Rice", "Spinach"]);
                assert!(args.result.no_prompt);
            }
            other => bail!("unexpected command {other:?}"),
        }
        Ok(())
    }
}
