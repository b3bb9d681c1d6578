use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Mailer, NotifyError, OutgoingEmail};
use crate::community::models::{ActiveEvent, Community, Contributor};
use crate::config::SmtpConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self, NotifyError> {
        let from = cfg
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Address(cfg.from.clone(), e))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?.port(cfg.port);
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Address(email.to.clone(), e))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())?;

        let response = self.transport.send(message).await?;
        if !response.is_positive() {
            return Err(NotifyError::Rejected(response.code().to_string()));
        }
        Ok(())
    }
}

/// Writes the message to the log instead of sending it. Selected with
/// `HEYJACK_SMTP_HOST=log`.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), NotifyError> {
        tracing::info!(to = %email.to, subject = %email.subject, bytes = email.html.len(), "email (log only)");
        Ok(())
    }
}

/// `1500.0` -> `$1.500`, `1500.5` -> `$1.500,50`.
pub(crate) fn format_amount(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let (whole, frac) = (cents.abs() / 100, cents.abs() % 100);

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if cents < 0 { "-" } else { "" };
    if frac == 0 {
        format!("{sign}${grouped}")
    } else {
        format!("{sign}${grouped},{frac:02}")
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders the payment reminder for one contributor. `None` when the
/// contributor has no email address.
pub fn reminder_email(
    contributor: &Contributor,
    event: &ActiveEvent,
    community: &Community,
) -> Option<OutgoingEmail> {
    let to = contributor.normalized_email()?;

    let alias = community
        .creator_alias
        .as_deref()
        .map(|a| {
            format!(
                "<p>Podés transferir al alias <strong>{}</strong>.</p>",
                escape_html(a)
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="es">
<body style="font-family: Arial, sans-serif; color: #222; max-width: 560px; margin: 0 auto;">
  <h2 style="color: #e4572e;">¡Hey! Se acerca el cumple de {child}</h2>
  <p>Hola {parent},</p>
  <p>En <strong>{community}</strong> estamos juntando para el regalo de {child}, que cumple el <strong>{date}</strong>.</p>
  <p>Tu aporte es de <strong>{amount}</strong>.</p>
  {alias}
  <p>Cualquier duda escribile a {creator}.</p>
  <p style="font-size: 12px; color: #888;">Hey Jack · regalos grupales sin vueltas</p>
</body>
</html>"#,
        child = escape_html(&event.child_name),
        parent = escape_html(&contributor.parent_name),
        community = escape_html(&community.name),
        date = event.event_date.format("%d/%m/%Y"),
        amount = format_amount(contributor.amount),
        alias = alias,
        creator = escape_html(&community.creator_name),
    );

    Some(OutgoingEmail {
        to,
        subject: format!("Recordatorio: regalo para {}", event.child_name),
        html,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{active_event, community, contributor};

    #[test]
    fn amounts_use_dot_thousands_and_comma_decimals() {
        assert_eq!(format_amount(500.0), "$500");
        assert_eq!(format_amount(1500.0), "$1.500");
        assert_eq!(format_amount(1234567.5), "$1.234.567,50");
    }

    #[test]
    fn reminder_substitutes_and_escapes_values() {
        let mut row = contributor("c1", "ae1", Some(" Laura@Mail.com "), 1500.0);
        row.parent_name = "Laura <b>".into();
        let email = reminder_email(&row, &active_event("ae1", "k1", 3000.0), &community("k1"))
            .unwrap();

        assert_eq!(email.to, "laura@mail.com");
        assert_eq!(email.subject, "Recordatorio: regalo para Lola");
        assert!(email.html.contains("Hola Laura &lt;b&gt;,"));
        assert!(email.html.contains("$1.500"));
        assert!(email.html.contains("18/05/2026"));
        assert!(email.html.contains("marta.mp"));
    }

    #[test]
    fn no_email_means_no_reminder() {
        let row = contributor("c1", "ae1", None, 1500.0);
        assert!(reminder_email(&row, &active_event("ae1", "k1", 3000.0), &community("k1")).is_none());
    }

    #[test]
    fn smtp_mailer_rejects_a_bad_sender() {
        let cfg = SmtpConfig {
            host: "localhost".into(),
            port: 587,
            username: None,
            password: None,
            from: "not an address".into(),
        };
        assert!(matches!(
            SmtpMailer::from_config(&cfg),
            Err(NotifyError::Address(..))
        ));
    }
}
