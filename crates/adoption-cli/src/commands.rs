//! CLI commands

use std::future::Future;
use std::sync::Arc;

use adoption_api::{
    AdoptionClient, ApplicationStatus, AuthApi, Credentials, NewApplication, NewInquiry, NewMessage,
    PetFilters, PetInput, PetStatus, Registration, UserRole,
};
use adoption_session::SessionManager;
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{CliError, Result};

/// Everything a command needs
pub struct App {
    pub client: AdoptionClient,
    pub session: Arc<SessionManager>,
    pub config: Config,
}

impl App {
    /// Call the API with the session's access token, refreshing it once on 401
    async fn authed<T, F, Fut>(&self, call: F) -> Result<T>
    where
        F: Fn(AdoptionClient, String) -> Fut,
        Fut: Future<Output = adoption_api::Result<T>>,
    {
        let client = &self.client;
        Ok(self
            .session
            .authorized(|token| call(client.clone(), token))
            .await?)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the API is reachable
    Health,

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        /// Falls back to ADOPTION_PASSWORD
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        /// Register as a listing owner instead of an adopter
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },

    /// Sign in
    Login {
        #[arg(long)]
        email: String,
        /// Falls back to ADOPTION_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },

    /// Sign out and forget stored tokens
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Browse adoptable pets
    Pets(PetArgs),

    /// Show one pet
    Pet { id: String },

    /// List your own listings
    MyPets,

    /// Post a pet for adoption
    CreatePet(NewPetArgs),

    /// Change a listing's status
    MarkPet {
        id: String,
        #[arg(value_enum)]
        status: PetStatusArg,
    },

    /// Remove a listing
    DeletePet { id: String },

    /// List favorited pets
    Favorites,

    Favorite { pet_id: String },

    Unfavorite { pet_id: String },

    /// Ask a listing owner about a pet
    Inquire {
        pet_id: String,
        message: String,
        #[arg(long)]
        phone: Option<String>,
    },

    /// List inquiries you sent (or received, for owners)
    Inquiries {
        #[arg(long)]
        received: bool,
    },

    /// Answer an inquiry about one of your listings
    Respond { inquiry_id: String, response: String },

    /// Apply to adopt a pet
    Apply(ApplyArgs),

    /// List applications you submitted (or received, for owners)
    Applications {
        #[arg(long)]
        received: bool,
    },

    /// Move an application to a new status
    Review {
        application_id: String,
        #[arg(value_enum)]
        status: ApplicationStatusArg,
    },

    /// List conversations
    Inbox,

    /// Show the messages in a conversation
    Conversation { id: String },

    /// Send a message
    Message {
        recipient_id: String,
        body: String,
        /// Pet the message is about
        #[arg(long)]
        pet: Option<String>,
    },

    /// List notifications
    Notifications {
        /// Keep running and print the unread count whenever it changes
        #[arg(long)]
        watch: bool,
        #[arg(long, conflicts_with = "watch")]
        mark_all_read: bool,
    },

    /// Mark one notification read
    Read { notification_id: String },
}

#[derive(Args, Debug, Default)]
pub struct PetArgs {
    #[arg(long)]
    species: Option<String>,
    #[arg(long)]
    breed: Option<String>,
    /// kitten, young, adult or senior
    #[arg(long)]
    age_group: Option<String>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    max_fee: Option<f64>,
    #[arg(long)]
    good_with_kids: bool,
    #[arg(long)]
    good_with_dogs: bool,
    #[arg(long)]
    good_with_cats: bool,
    #[arg(long, value_enum)]
    status: Option<PetStatusArg>,
    #[arg(long, short)]
    search: Option<String>,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
}

impl From<PetArgs> for PetFilters {
    fn from(args: PetArgs) -> Self {
        PetFilters {
            species: args.species,
            breed: args.breed,
            age_group: args.age_group,
            gender: args.gender,
            size: args.size,
            location: args.location,
            max_fee: args.max_fee,
            // A bare flag means "must be"; leaving it off means "don't care"
            good_with_kids: args.good_with_kids.then_some(true),
            good_with_dogs: args.good_with_dogs.then_some(true),
            good_with_cats: args.good_with_cats.then_some(true),
            status: args.status.map(PetStatus::from),
            search: args.search,
            sort: args.sort,
            page: args.page,
            limit: args.limit,
        }
    }
}

#[derive(Args, Debug)]
pub struct NewPetArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "cat")]
    species: String,
    #[arg(long)]
    breed: Option<String>,
    #[arg(long)]
    age_months: Option<u32>,
    #[arg(long)]
    gender: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    location: Option<String>,
    #[arg(long)]
    fee: Option<f64>,
}

impl From<NewPetArgs> for PetInput {
    fn from(args: NewPetArgs) -> Self {
        PetInput {
            name: Some(args.name),
            species: Some(args.species),
            breed: args.breed,
            age_months: args.age_months,
            gender: args.gender,
            description: args.description,
            location: args.location,
            adoption_fee: args.fee,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    pet_id: String,
    #[arg(long)]
    message: Option<String>,
    /// house, apartment, ...
    #[arg(long)]
    housing_type: Option<String>,
    #[arg(long)]
    other_pets: Option<bool>,
    #[arg(long)]
    children: Option<bool>,
}

impl From<ApplyArgs> for NewApplication {
    fn from(args: ApplyArgs) -> Self {
        NewApplication {
            pet_id: args.pet_id,
            message: args.message,
            housing_type: args.housing_type,
            has_other_pets: args.other_pets,
            has_children: args.children,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoleArg {
    Adopter,
    Owner,
}

impl From<RoleArg> for UserRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Adopter => UserRole::Adopter,
            RoleArg::Owner => UserRole::Owner,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PetStatusArg {
    Available,
    Pending,
    Adopted,
}

impl From<PetStatusArg> for PetStatus {
    fn from(status: PetStatusArg) -> Self {
        match status {
            PetStatusArg::Available => PetStatus::Available,
            PetStatusArg::Pending => PetStatus::Pending,
            PetStatusArg::Adopted => PetStatus::Adopted,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ApplicationStatusArg {
    UnderReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl From<ApplicationStatusArg> for ApplicationStatus {
    fn from(status: ApplicationStatusArg) -> Self {
        match status {
            ApplicationStatusArg::UnderReview => ApplicationStatus::UnderReview,
            ApplicationStatusArg::Approved => ApplicationStatus::Approved,
            ApplicationStatusArg::Rejected => ApplicationStatus::Rejected,
            ApplicationStatusArg::Withdrawn => ApplicationStatus::Withdrawn,
        }
    }
}

impl Commands {
    pub async fn execute(self, app: &App) -> Result<()> {
        match self {
            Commands::Health => print_json(&app.client.health().await?),

            Commands::Register {
                email,
                name,
                password,
                phone,
                role,
            } => {
                let registration = Registration {
                    email,
                    password: password_or_env(password)?,
                    name,
                    phone,
                    role: role.map(UserRole::from),
                };
                let user = app.session.register(&registration).await?;
                print_json(&user)
            }

            Commands::Login { email, password } => {
                let credentials = Credentials {
                    email,
                    password: password_or_env(password)?,
                };
                let user = app.session.login(&credentials).await?;
                print_json(&user)
            }

            Commands::Logout => {
                app.session.logout().await;
                print_json(&json!({ "signedOut": true }))
            }

            Commands::Whoami => {
                let user = app.session.refresh_user().await?;
                let claims = app.session.claims();
                print_json(&json!({
                    "user": user,
                    "isAdmin": app.session.is_admin(),
                    "tokenExpiresAt": claims.and_then(|c| c.expires_at()),
                }))
            }

            Commands::Pets(args) => {
                let page = app.client.list_pets(&PetFilters::from(args)).await?;
                print_json(&page)
            }

            Commands::Pet { id } => print_json(&app.client.get_pet(&id).await?),

            Commands::MyPets => {
                let pets = app
                    .authed(|client, token| async move { client.my_pets(&token).await })
                    .await?;
                print_json(&pets)
            }

            Commands::CreatePet(args) => {
                let input = PetInput::from(args);
                let input = &input;
                let pet = app
                    .authed(move |client, token| async move {
                        client.create_pet(&token, input).await
                    })
                    .await?;
                info!(pet_id = %pet.id, "Listing created");
                print_json(&pet)
            }

            Commands::MarkPet { id, status } => {
                let input = PetInput {
                    status: Some(status.into()),
                    ..Default::default()
                };
                let (id, input) = (&id, &input);
                let pet = app
                    .authed(move |client, token| async move {
                        client.update_pet(&token, id, input).await
                    })
                    .await?;
                print_json(&pet)
            }

            Commands::DeletePet { id } => {
                let id = &id;
                app.authed(move |client, token| async move { client.delete_pet(&token, id).await })
                    .await?;
                print_json(&json!({ "deleted": id }))
            }

            Commands::Favorites => {
                let favorites = app
                    .authed(|client, token| async move { client.favorites(&token).await })
                    .await?;
                print_json(&favorites)
            }

            Commands::Favorite { pet_id } => {
                let pet_id = &pet_id;
                app.authed(move |client, token| async move {
                    client.add_favorite(&token, pet_id).await
                })
                .await?;
                print_json(&json!({ "favorited": pet_id }))
            }

            Commands::Unfavorite { pet_id } => {
                let pet_id = &pet_id;
                app.authed(move |client, token| async move {
                    client.remove_favorite(&token, pet_id).await
                })
                .await?;
                print_json(&json!({ "unfavorited": pet_id }))
            }

            Commands::Inquire {
                pet_id,
                message,
                phone,
            } => {
                let inquiry = NewInquiry {
                    pet_id,
                    message,
                    contact_phone: phone,
                };
                let inquiry = &inquiry;
                let sent = app
                    .authed(move |client, token| async move {
                        client.send_inquiry(&token, inquiry).await
                    })
                    .await?;
                print_json(&sent)
            }

            Commands::Inquiries { received } => {
                let inquiries = app
                    .authed(move |client, token| async move {
                        if received {
                            client.received_inquiries(&token).await
                        } else {
                            client.inquiries(&token).await
                        }
                    })
                    .await?;
                print_json(&inquiries)
            }

            Commands::Respond {
                inquiry_id,
                response,
            } => {
                let (inquiry_id, response) = (&inquiry_id, &response);
                let updated = app
                    .authed(move |client, token| async move {
                        client
                            .respond_to_inquiry(&token, inquiry_id, response)
                            .await
                    })
                    .await?;
                print_json(&updated)
            }

            Commands::Apply(args) => {
                let application = NewApplication::from(args);
                let application = &application;
                let submitted = app
                    .authed(move |client, token| async move {
                        client.submit_application(&token, application).await
                    })
                    .await?;
                print_json(&submitted)
            }

            Commands::Applications { received } => {
                let applications = app
                    .authed(move |client, token| async move {
                        if received {
                            client.received_applications(&token).await
                        } else {
                            client.applications(&token).await
                        }
                    })
                    .await?;
                print_json(&applications)
            }

            Commands::Review {
                application_id,
                status,
            } => {
                let application_id = &application_id;
                let status = ApplicationStatus::from(status);
                let updated = app
                    .authed(move |client, token| async move {
                        client
                            .update_application_status(&token, application_id, status)
                            .await
                    })
                    .await?;
                print_json(&updated)
            }

            Commands::Inbox => {
                let conversations = app
                    .authed(|client, token| async move { client.conversations(&token).await })
                    .await?;
                print_json(&conversations)
            }

            Commands::Conversation { id } => {
                let id = &id;
                let messages = app
                    .authed(move |client, token| async move {
                        client.conversation_messages(&token, id).await
                    })
                    .await?;
                print_json(&messages)
            }

            Commands::Message {
                recipient_id,
                body,
                pet,
            } => {
                let message = NewMessage {
                    recipient_id,
                    pet_id: pet,
                    body,
                };
                let message = &message;
                let sent = app
                    .authed(move |client, token| async move {
                        client.send_message(&token, message).await
                    })
                    .await?;
                print_json(&sent)
            }

            Commands::Notifications {
                watch: true,
                ..
            } => watch_unread(app).await,

            Commands::Notifications {
                mark_all_read: true,
                ..
            } => {
                app.authed(|client, token| async move {
                    client.mark_all_notifications_read(&token).await
                })
                .await?;
                print_json(&json!({ "markedAllRead": true }))
            }

            Commands::Notifications { .. } => {
                let notifications = app
                    .authed(|client, token| async move { client.notifications(&token).await })
                    .await?;
                print_json(&notifications)
            }

            Commands::Read { notification_id } => {
                let notification_id = &notification_id;
                app.authed(move |client, token| async move {
                    client
                        .mark_notification_read(&token, notification_id)
                        .await
                })
                .await?;
                print_json(&json!({ "read": notification_id }))
            }
        }
    }
}

/// Print the unread count now and again whenever it changes, until Ctrl-C
/// or the session ends
async fn watch_unread(app: &App) -> Result<()> {
    let initial = app
        .authed(|client, token| async move { client.unread_count(&token).await })
        .await?;
    print_json(&initial)?;

    let client = app.client.clone();
    let mut unread = app
        .session
        .watch_unread_count(app.config.poll_interval, move |token| {
            let client = client.clone();
            async move { client.unread_count(&token).await.map(|c| c.count) }
        });
    info!(
        interval_secs = app.config.poll_interval.as_secs(),
        "Watching unread notifications"
    );

    let mut last = initial.count;
    loop {
        tokio::select! {
            changed = unread.changed() => {
                if changed.is_err() {
                    debug!("Unread poller stopped");
                    break;
                }
                let count = *unread.borrow_and_update();
                if count != last {
                    last = count;
                    print_json(&json!({ "count": count }))?;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.session.stop_background_tasks();
    Ok(())
}

fn password_or_env(password: Option<String>) -> Result<String> {
    password
        .or_else(|| std::env::var("ADOPTION_PASSWORD").ok())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            CliError::Config("password required: pass --password or set ADOPTION_PASSWORD".into())
        })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
