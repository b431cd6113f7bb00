use iced::futures::stream::{self, Stream};
use iced::{Element, Task, Theme};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod backend;
mod config;
mod error;
mod state;
mod ui;

use backend::{Backend, Session};
use config::{AppConfig, ConfigOrigin};
use ui::{add_farm, auth, farms_list, Action, Context, Route};

/// Screen currently on display
enum Screen {
    Auth(auth::State),
    FarmsList(farms_list::State),
    AddFarm(add_farm::State),
}

/// Main application state
struct FarmTracker {
    context: Context,
    screen: Screen,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// The auth gateway reported a sign-in or sign-out
    SessionChanged(Option<Session>),
    Auth(auth::Message),
    FarmsList(farms_list::Message),
    AddFarm(add_farm::Message),
}

impl FarmTracker {
    fn new(context: Context) -> (Self, Task<Message>) {
        let changes = session_changes(context.backend.auth.on_session_change());

        let mut app = FarmTracker {
            context,
            screen: Screen::Auth(auth::State::new(auth::Mode::Login)),
        };

        // A gateway that restores sessions would land straight on the list
        let start = match app.context.backend.auth.current_session() {
            Some(_) => app.navigate(Route::FarmsList),
            None => Task::none(),
        };

        (app, Task::batch([start, Task::run(changes, Message::SessionChanged)]))
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::SessionChanged(Some(session)) => {
                info!("Session started for {}", session.email);
                match self.screen {
                    Screen::Auth(_) => self.navigate(Route::FarmsList),
                    _ => Task::none(),
                }
            }
            Message::SessionChanged(None) => match self.screen {
                Screen::Auth(_) => Task::none(),
                _ => self.navigate(Route::Login),
            },
            Message::Auth(message) => match &mut self.screen {
                Screen::Auth(screen) => {
                    let action = screen.update(message, &self.context);
                    self.perform(action, Message::Auth)
                }
                _ => Task::none(),
            },
            Message::FarmsList(message) => match &mut self.screen {
                Screen::FarmsList(screen) => {
                    let action = screen.update(message, &self.context);
                    self.perform(action, Message::FarmsList)
                }
                _ => Task::none(),
            },
            Message::AddFarm(message) => match &mut self.screen {
                Screen::AddFarm(screen) => {
                    let action = screen.update(message, &self.context);
                    self.perform(action, Message::AddFarm)
                }
                _ => Task::none(),
            },
        }
    }

    fn perform<M: Send + 'static>(
        &mut self,
        action: Action<M>,
        wrap: fn(M) -> Message,
    ) -> Task<Message> {
        match action {
            Action::None => Task::none(),
            Action::Run(task) => task.map(wrap),
            Action::Navigate(route) => self.navigate(route),
        }
    }

    /// Replace the current screen. Leaving the list stops its live feed.
    fn navigate(&mut self, route: Route) -> Task<Message> {
        if let Screen::FarmsList(list) = &mut self.screen {
            list.leave();
        }

        let (screen, task) = match route {
            Route::Login => (Screen::Auth(auth::State::new(auth::Mode::Login)), Task::none()),
            Route::SignUp => (Screen::Auth(auth::State::new(auth::Mode::SignUp)), Task::none()),
            Route::FarmsList => {
                let (list, task) = farms_list::State::activate(&self.context);
                (Screen::FarmsList(list), task.map(Message::FarmsList))
            }
            Route::AddFarm => (Screen::AddFarm(add_farm::State::default()), Task::none()),
        };

        self.screen = screen;
        task
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        match &self.screen {
            Screen::Auth(screen) => screen.view().map(Message::Auth),
            Screen::FarmsList(screen) => screen.view().map(Message::FarmsList),
            Screen::AddFarm(screen) => screen.view().map(Message::AddFarm),
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Light
    }
}

/// Every value the session watch takes after startup
fn session_changes(
    receiver: watch::Receiver<Option<Session>>,
) -> impl Stream<Item = Option<Session>> + Send + 'static {
    stream::unfold(receiver, |mut receiver| async move {
        receiver.changed().await.ok()?;
        let session = receiver.borrow_and_update().clone();
        Some((session, receiver))
    })
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    fmt().with_env_filter(filter).init();
}

fn main() -> iced::Result {
    // Logging depends on the config, so loading is reported once logging is up
    let loaded = AppConfig::load();
    let config = match &loaded {
        Ok((config, _)) => config.clone(),
        Err(_) => AppConfig::default(),
    };

    init_logging(&config);
    match loaded {
        Ok((_, ConfigOrigin::File(path))) => info!("Loaded config from {:?}", path),
        Ok((_, ConfigOrigin::CreatedDefault(path))) => {
            warn!("No config found, created default at {:?}", path)
        }
        Err(e) => warn!("Could not load config, using defaults: {}", e),
    }

    let backend = match Backend::open_local(&config) {
        Ok(backend) => backend,
        Err(e) => {
            // The app cannot function without its backend
            error!("Failed to open backend at {}: {}", config.data_dir.display(), e);
            std::process::exit(1);
        }
    };

    info!("🌾 Farm tracker starting");
    let context = Context { backend, config };

    iced::application("Farm Tracker", FarmTracker::update, FarmTracker::view)
        .theme(FarmTracker::theme)
        .centered()
        .run_with(move || FarmTracker::new(context))
}
