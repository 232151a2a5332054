use runnel::coordinator::Coordinator;
use runnel::dispatch::DefaultDispatchers;
use runnel::ui::{self, ViewState};

use color_eyre::Result;
use crossterm::{
    cursor::Show,
    event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The pipeline logs land here; the terminal itself belongs to the TUI.
const LOG_FILE: &str = "runnel.log";

fn main() -> Result<()> {
    // Handle --version flag before any initialization
    if std::env::args().any(|arg| arg == "--version") {
        println!("runnel {}", VERSION);
        std::process::exit(0);
    }

    color_eyre::install()?;

    // Setup panic hook to ensure terminal cleanup on panic
    setup_panic_hook();

    // Every tracing event the demos emit goes to the log file; watch it
    // with `tail -f runnel.log` next to the TUI. RUST_LOG filters apply.
    let log_file = std::fs::File::create(LOG_FILE)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("runnel=debug")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();

    // One runtime for the whole application; it doubles as the `main`
    // execution context.
    let runtime = tokio::runtime::Runtime::new()?;
    let dispatchers = Arc::new(DefaultDispatchers::new(runtime.handle().clone())?);

    // Construction starts every background demo; their output is in the log.
    let coordinator = Coordinator::new(dispatchers);
    info!(stage = "lifecycle", version = VERSION, "demos started");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Main event loop
    let result = runtime.block_on(run_app(&mut terminal, &coordinator));

    // Stop every background producer before the terminal goes back
    runtime.block_on(coordinator.shutdown());

    restore_terminal(&mut terminal)?;
    result
}

/// Setup panic hook to restore terminal on panic
fn setup_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        // Try to restore terminal state
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        let _ = execute!(io::stdout(), Show);

        // Call the original panic hook
        original_hook(panic_info);
    }));
}

/// Restore terminal to normal mode
fn restore_terminal<B: ratatui::backend::Backend + std::io::Write>(
    terminal: &mut Terminal<B>,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    coordinator: &Coordinator,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    // Create async event stream for keyboard input
    let mut event_stream = EventStream::new();

    // The two subscriptions the shell renders: the counter cell replays its
    // current value first, the greeting channel only yields what is
    // published while we listen.
    let mut counter_values = coordinator.counter().subscribe();
    let mut greetings = coordinator.greetings().subscribe();

    let mut view = ViewState::new(coordinator.counter().read());

    // The greeting run starts with the shell, so the first toasts appear
    // without any keypress.
    coordinator.say_hello();

    loop {
        // Draw the UI only when needed
        if view.dirty {
            terminal.draw(|f| ui::render(f, &view))?;
            view.dirty = false;
        }

        // 16ms tick for the spinner and toast timers
        let timeout = tokio::time::sleep(std::time::Duration::from_millis(16));

        tokio::select! {
            _ = timeout => {
                view.tick();
            }

            // Counter cell subscription: replay-first, then every write
            value = counter_values.next() => {
                if let Some(Ok(value)) = value {
                    view.set_counter(value);
                }
            }

            // Greeting broadcast: one transient toast per value
            greeting = greetings.next() => {
                if let Some(Ok(greeting)) = greeting {
                    info!(stage = "toast", message = %greeting, "greeting displayed");
                    view.show_toast(greeting);
                }
            }

            // Handle keyboard events
            event_result = event_stream.next() => {
                if let Some(Ok(event)) = event_result {
                    match event {
                        Event::Resize(_, _) => {
                            view.dirty = true;
                        }
                        Event::Key(key) if key.kind == KeyEventKind::Press => {
                            match key.code {
                                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                                    return Ok(());
                                }
                                KeyCode::Char('q') | KeyCode::Esc => {
                                    return Ok(());
                                }
                                KeyCode::Char(' ') | KeyCode::Char('+') | KeyCode::Enter => {
                                    coordinator.increment_counter();
                                }
                                KeyCode::Char('h') => {
                                    coordinator.say_hello();
                                }
                                KeyCode::Char('n') => {
                                    coordinator.trigger_notification();
                                }
                                _ => {}
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}
