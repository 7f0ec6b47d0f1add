use attendance_core::{guard, Navigation, RegistrationStatus};
use attendance_lib::{
    app::App,
    config::{Command, Config},
};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let config = Config::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.settings.log_level.as_str()),
    )
    .init();

    let app = App::open(&config.settings)?;

    match config.command {
        Command::LoginUrl => {
            let oauth = app
                .oauth
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Identity provider is not configured"))?;
            println!("{}", oauth.authorize_url());
        }
        Command::Callback { code } => {
            app.gate.complete_login(&code).await?;
            let subject = app.gate.session().current_identity_subject()?;
            println!("✅ Signed in as {}", subject.user_name());
        }
        Command::Whoami => {
            if !app.gate.session().has_session() {
                anyhow::bail!("Not signed in");
            }
            let subject = app.gate.session().current_identity_subject()?;
            println!("Subject: {}", subject.sub);
            if let Some(email) = &subject.email {
                println!("Email:   {}", email);
            }
        }
        Command::Refresh => {
            app.gate.session().refresh().await?;
            println!("✅ Tokens refreshed");
        }
        Command::Logout => {
            app.gate.sign_out()?;
            println!("✅ Signed out");
            if let Some(oauth) = &app.oauth {
                println!("   Finish provider logout at: {}", oauth.logout_url());
            }
        }
        Command::Enroll { label } => {
            app.gate.enroll(&label).await?;
            println!("✅ Biometric credential registered");
        }
        Command::Unenroll => {
            app.gate.biometric().clear_registration()?;
            println!("✅ Biometric credential removed");
        }
        Command::Status => print_status(&app).await,
        Command::Open { path } => match guard(&app.gate, &path).await {
            Navigation::Render(route) => println!("✅ {}", route.path()),
            Navigation::Redirect { to, error } => {
                println!("↪ {}", to.path());
                if let Some(error) = error {
                    println!("   {} ({})", error, error.code());
                }
            }
        },
    }

    Ok(())
}

async fn print_status(app: &App) {
    let session = app.gate.session();
    println!("Tab:            {}", app.tab_id());
    if session.has_session() {
        match session.current_identity_subject() {
            Ok(subject) => println!("Session:        {}", subject.user_name()),
            Err(e) => println!("Session:        present but unreadable ({e})"),
        }
    } else {
        println!("Session:        none");
    }

    match app.gate.biometric().status().await {
        RegistrationStatus::Unsupported => println!("Biometric:      unavailable on this device"),
        RegistrationStatus::Unenrolled => println!("Biometric:      not enrolled"),
        RegistrationStatus::Enrolled {
            registered_at,
            expired,
            verified_until,
        } => {
            let state = if expired { "expired" } else { "enrolled" };
            println!(
                "Biometric:      {} ({})",
                state,
                registered_at.format("%Y-%m-%d %H:%M:%S")
            );
            match verified_until {
                Some(until) => println!("Verified until: {}", until.format("%Y-%m-%d %H:%M:%S")),
                None => println!("Verified until: -"),
            }
        }
    }
}
