//! Signs in with GitHub through a heatchat backend and prints the user.
//!
//! ```text
//! HEATCHAT_API_URL=http://localhost:4000 cargo run -p github-login
//! HEATCHAT_API_URL=http://localhost:4000 cargo run -p github-login -- logout
//! ```
//!
//! Optional: `HEATCHAT_CLIENT_ID`, `HEATCHAT_CALLBACK_ADDR` (the GitHub
//! app's callback URL must point there), `RUST_LOG`.

use heatchat::prelude::*;

#[tokio::main]
async fn main() {
    heatchat::init_tracing("heatchat=info,github_login=info");

    if let Err(e) = run().await {
        if e.is_cancelled() {
            println!("sign-in cancelled");
        } else {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), HeatchatError> {
    let api_url = std::env::var("HEATCHAT_API_URL")
        .map_err(|_| HeatchatError::Config("HEATCHAT_API_URL is not set".into()))?;

    let mut builder = Heatchat::builder().api_base_url(&api_url).opener(|url| {
        println!("Opening {url}");
        open_or_print(url);
        Ok(())
    });
    if let Ok(client_id) = std::env::var("HEATCHAT_CLIENT_ID") {
        builder = builder.client_id(&client_id);
    }
    if let Ok(addr) = std::env::var("HEATCHAT_CALLBACK_ADDR") {
        builder = builder.callback_addr(&addr);
    }
    let client = builder.build().await?;

    if std::env::args().nth(1).as_deref() == Some("logout") {
        client.sign_out().await?;
        println!("signed out");
        return Ok(());
    }

    let user = match client.user() {
        Some(user) => {
            tracing::info!(login = %user.login, "using stored session");
            user
        }
        None => client.sign_in().await?,
    };

    println!("Signed in as {} ({})", user.name, user.login);
    println!("Avatar: {}", user.avatar_url);
    Ok(())
}

/// Tries the system browser; on headless machines the printed URL is
/// all the user gets.
fn open_or_print(url: &url::Url) {
    if let Err(e) = open::that(url.as_str()) {
        tracing::debug!(error = %e, "no browser available, open the URL manually");
    }
}
