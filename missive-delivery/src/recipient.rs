//! Per-send projection of a subscriber.

use missive_common::Subscriber;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("API base URL must be http or https: {0}")]
    NotHttp(String),
}

/// Builds the unsubscribe links embedded in list mail.
#[derive(Debug, Clone)]
pub struct UnsubscribeLinks {
    email_address: String,
    api_base_url: Url,
}

impl UnsubscribeLinks {
    /// # Errors
    ///
    /// Returns a [`LinkError`] if `api_base_url` is not an absolute HTTP(S)
    /// URL or `email_address` does not form a valid `mailto:` URI.
    pub fn new(email_address: &str, api_base_url: &str) -> Result<Self, LinkError> {
        Url::parse(&format!("mailto:{email_address}"))?;

        let api_base_url = Url::parse(api_base_url)?;
        if !matches!(api_base_url.scheme(), "http" | "https") {
            return Err(LinkError::NotHttp(api_base_url.to_string()));
        }

        Ok(Self {
            email_address: email_address.to_string(),
            api_base_url,
        })
    }

    /// `<api>/unsubscribe/<email>/<uid>`
    #[must_use]
    pub fn url(&self, email: &str, uid: Uuid) -> String {
        let mut url = self.api_base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["unsubscribe", email, &uid.to_string()]);
        }
        url.into()
    }

    /// `mailto:<list unsubscribe address>?subject=<email>%20<uid>`, with the
    /// subject percent-encoded as a single query value.
    #[must_use]
    pub fn mailto(&self, email: &str, uid: Uuid) -> String {
        let mut mailto = format!("mailto:{}", self.email_address);
        if let Ok(mut parsed) = Url::parse(&mailto) {
            let subject = format!("{email} {uid}");
            parsed.set_query(Some(&format!("subject={}", query_escape(&subject))));
            mailto = parsed.into();
        }
        mailto
    }

    /// Value of the `List-Unsubscribe` header.
    #[must_use]
    pub fn header(&self, email: &str, uid: Uuid) -> String {
        format!("<{}>, <{}>", self.mailto(email, uid), self.url(email, uid))
    }
}

/// Percent-encode `value` for a `mailto:` query.
///
/// `form_urlencoded` writes a space as `+`, which `mailto:` does not treat
/// as a space. A literal `+` is already `%2B`, so swapping is safe.
fn query_escape(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Unsubscribe details for a verified subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub url: String,
    pub header: String,
}

/// One recipient of a rendered message.
///
/// Recipients that are not verified subscribers carry no unsubscribe
/// details, and their messages get no `List-Unsubscribe` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub email: String,
    pub uid: Option<Uuid>,
    pub unsubscribe: Option<Unsubscribe>,
}

impl Recipient {
    /// A recipient without unsubscribe details.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            uid: None,
            unsubscribe: None,
        }
    }

    /// A list member. Only verified subscribers get unsubscribe details.
    #[must_use]
    pub fn from_subscriber(subscriber: &Subscriber, links: &UnsubscribeLinks) -> Self {
        let unsubscribe = subscriber.is_verified().then(|| Unsubscribe {
            url: links.url(&subscriber.email, subscriber.uid),
            header: links.header(&subscriber.email, subscriber.uid),
        });

        Self {
            email: subscriber.email.clone(),
            uid: Some(subscriber.uid),
            unsubscribe,
        }
    }

    #[must_use]
    pub fn unsubscribe_url(&self) -> Option<&str> {
        self.unsubscribe.as_ref().map(|u| u.url.as_str())
    }
}
