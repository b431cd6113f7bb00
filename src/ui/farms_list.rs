/// FarmsList screen
///
/// Shows the signed-in user's farms as they change. The live feed is an
/// abortable task wrapping a `FarmListSubscription`; leaving the screen
/// aborts the task, which drops (and so releases) the subscription.
///
/// Farm images are fetched from the blob store by durable URL, once per URL.

use iced::futures::stream::{self, Stream};
use iced::task::Handle;
use iced::widget::image::Handle as ImageHandle;
use iced::widget::{button, column, container, row, scrollable, text, Column, Image};
use iced::{Alignment, Element, Length, Task};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::{error_text, Action, Context, Route};
use crate::backend::{BlobStore, DocumentStore, Session};
use crate::error::AuthError;
use crate::state::data::FarmRecord;
use crate::state::subscription::FarmListSubscription;

/// A farm image as far as this screen knows it
enum Thumbnail {
    Loading,
    Ready(ImageHandle),
    Unavailable,
}

pub struct State {
    email: String,
    farms: Vec<FarmRecord>,
    images: HashMap<String, Thumbnail>,
    alert: Option<String>,
    feed: Option<Handle>,
}

#[derive(Debug, Clone)]
pub enum Message {
    Updated {
        farms: Vec<FarmRecord>,
        error: Option<String>,
    },
    FeedFailed(String),
    ImageLoaded {
        url: String,
        bytes: Result<Vec<u8>, String>,
    },
    AddFarm,
    SignOut,
    SignedOut(Result<(), AuthError>),
}

impl State {
    /// Enter the screen: start the live feed for the current session
    pub fn activate(context: &Context) -> (Self, Task<Message>) {
        let session = context.backend.auth.current_session();
        let feed = live_farms(
            Arc::clone(&context.backend.documents),
            context.config.farms_collection.clone(),
            session.clone(),
        );
        let (task, handle) = Task::run(feed, |message| message).abortable();

        let state = Self {
            email: session.map(|s| s.email).unwrap_or_default(),
            farms: Vec::new(),
            images: HashMap::new(),
            alert: None,
            feed: Some(handle),
        };
        (state, task)
    }

    #[cfg(test)]
    pub fn feed(&self) -> Option<&Handle> {
        self.feed.as_ref()
    }

    /// Leave the screen: stop the live feed
    pub fn leave(&mut self) {
        if let Some(feed) = self.feed.take() {
            feed.abort();
        }
    }

    pub fn update(&mut self, message: Message, context: &Context) -> Action<Message> {
        match message {
            Message::Updated { farms, error } => {
                self.farms = farms;
                self.alert = error;
                self.load_images(&context.backend.blobs)
            }
            Message::ImageLoaded { url, bytes } => {
                let thumbnail = match bytes {
                    Ok(bytes) => Thumbnail::Ready(ImageHandle::from_bytes(bytes)),
                    Err(e) => {
                        warn!("Could not load farm image {}: {}", url, e);
                        Thumbnail::Unavailable
                    }
                };
                self.images.insert(url, thumbnail);
                Action::None
            }
            Message::FeedFailed(error) => {
                self.alert = Some(error);
                Action::None
            }
            Message::AddFarm => Action::Navigate(Route::AddFarm),
            Message::SignOut => {
                let auth = Arc::clone(&context.backend.auth);
                Action::Run(Task::perform(
                    async move { auth.sign_out().await },
                    Message::SignedOut,
                ))
            }
            Message::SignedOut(Ok(())) => Action::Navigate(Route::Login),
            Message::SignedOut(Err(e)) => {
                self.alert = Some(e.to_string());
                Action::None
            }
        }
    }

    /// Start fetching every image the list shows but has not asked for yet
    fn load_images(&mut self, blobs: &Arc<dyn BlobStore>) -> Action<Message> {
        let mut loads = Vec::new();

        for farm in self.farms.iter().filter(|farm| farm.has_image()) {
            if self.images.contains_key(&farm.image) {
                continue;
            }
            self.images.insert(farm.image.clone(), Thumbnail::Loading);

            let blobs = Arc::clone(blobs);
            let url = farm.image.clone();
            loads.push(Task::perform(
                async move {
                    let bytes = blobs.get_by_url(&url).await.map_err(|e| e.to_string());
                    (url, bytes)
                },
                |(url, bytes)| Message::ImageLoaded { url, bytes },
            ));
        }

        if loads.is_empty() {
            Action::None
        } else {
            Action::Run(Task::batch(loads))
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        let header = row![
            text(format!("Email: {}", self.email)).size(16).width(Length::Fill),
            button("Sign out").on_press(Message::SignOut),
        ]
        .align_y(Alignment::Center)
        .padding(20);

        let list_header = row![
            text("Farms list").size(16).width(Length::Fill),
            button("Add farms").on_press(Message::AddFarm),
        ]
        .align_y(Alignment::Center)
        .padding(20);

        let body: Element<'_, Message> = if self.farms.is_empty() {
            container(text("No found data").size(18))
                .width(Length::Fill)
                .height(Length::Fill)
                .center_x(Length::Fill)
                .center_y(Length::Fill)
                .into()
        } else {
            let items = self
                .farms
                .iter()
                .fold(Column::new().spacing(16).padding(20), |list, farm| {
                    list.push(farm_item(farm, self.images.get(&farm.image)))
                });
            scrollable(items).height(Length::Fill).into()
        };

        column![header, list_header]
            .push_maybe(self.alert.as_deref().map(error_text))
            .push(body)
            .into()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        self.leave();
    }
}

fn farm_item<'a>(farm: &'a FarmRecord, thumbnail: Option<&Thumbnail>) -> Element<'a, Message> {
    let picture: Element<'a, Message> = match thumbnail {
        _ if !farm.has_image() => text("(no image)").size(12).into(),
        Some(Thumbnail::Ready(handle)) => Image::new(handle.clone())
            .width(Length::Fixed(160.0))
            .into(),
        Some(Thumbnail::Unavailable) => text("(image unavailable)").size(12).into(),
        Some(Thumbnail::Loading) | None => text("Loading image...").size(12).into(),
    };

    column![
        text(format!("Display name: {}", farm.display_name)),
        text(format!("Name: {}", farm.name)),
        text(format!("Phone: {}", farm.phone.as_deref().unwrap_or(""))),
        text(format!("Open hours: {}", farm.open_hours.as_deref().unwrap_or(""))),
        picture,
    ]
    .spacing(4)
    .into()
}

enum Feed {
    Opening {
        documents: Arc<dyn DocumentStore>,
        collection: String,
        session: Option<Session>,
    },
    Live(FarmListSubscription),
    Closed,
}

/// Stream of list updates: open the subscription, then one message per snapshot
fn live_farms(
    documents: Arc<dyn DocumentStore>,
    collection: String,
    session: Option<Session>,
) -> impl Stream<Item = Message> + Send + 'static {
    let opening = Feed::Opening {
        documents,
        collection,
        session,
    };

    stream::unfold(opening, |feed| async move {
        let mut subscription = match feed {
            Feed::Opening {
                documents,
                collection,
                session,
            } => {
                match FarmListSubscription::activate(
                    documents.as_ref(),
                    &collection,
                    session.as_ref(),
                )
                .await
                {
                    Ok(subscription) => subscription,
                    Err(e) => return Some((Message::FeedFailed(e.to_string()), Feed::Closed)),
                }
            }
            Feed::Live(subscription) => subscription,
            Feed::Closed => return None,
        };

        if !subscription.changed().await {
            return None;
        }

        let message = Message::Updated {
            farms: subscription.farms().to_vec(),
            error: subscription.last_error().map(|e| e.to_string()),
        };
        Some((message, Feed::Live(subscription)))
    })
}
