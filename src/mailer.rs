use anyhow::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, mail: OutgoingMail) -> Result<()>;
}

/// Writes mail to the log instead of delivering it.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<()> {
        tracing::info!(
            component = "mailer",
            to = %mail.to,
            subject = %mail.subject,
            body = %mail.body,
            "mail queued"
        );
        Ok(())
    }
}

pub fn password_reset_mail(
    to: &str,
    reset_url: &str,
    token: &str,
    expiry_minutes: i64,
) -> OutgoingMail {
    let separator = if reset_url.contains('?') { '&' } else { '?' };
    OutgoingMail {
        to: to.to_string(),
        subject: "パスワード再設定のご案内".to_string(),
        body: format!(
            "以下のURLからパスワードを再設定してください。\n\
             {reset_url}{separator}token={token}\n\n\
             このURLの有効期限は{expiry_minutes}分です。"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_link_appends_token() {
        let mail = password_reset_mail("a@example.com", "https://app.example.com/reset", "abc", 30);
        assert!(mail.body.contains("https://app.example.com/reset?token=abc"));
        assert!(mail.body.contains("30分"));

        let mail = password_reset_mail("a@example.com", "https://app.example.com/r?x=1", "abc", 30);
        assert!(mail.body.contains("https://app.example.com/r?x=1&token=abc"));
    }
}
