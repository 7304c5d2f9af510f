/// HTML email templates
///
/// Placeholders are written `{name}` and filled by [`render`]. Values are
/// HTML-escaped before substitution.

const LAYOUT: &str = r#"<!DOCTYPE html>
<html lang="fr">
<head><meta charset="UTF-8"><meta name="viewport" content="width=device-width, initial-scale=1.0"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="background: #0077B5; padding: 20px; text-align: center;">
    <h1 style="color: white; margin: 0;">{title}</h1>
  </div>
  <div style="background-color: #f9f9f9; padding: 20px; border-radius: 0 0 5px 5px;">
    {body}
    <p>L'équipe Panneaux</p>
  </div>
</body>
</html>"#;

pub const VERIFICATION: &str = r#"<p>Bonjour {name},</p>
<p>Merci pour votre inscription. Votre code de vérification est :</p>
<div style="text-align: center; margin: 30px 0;">
  <span style="font-size: 32px; font-weight: bold; letter-spacing: 5px; color: #4CAF50;">{verificationCode}</span>
</div>
<p>Saisissez ce code sur la page de vérification. Il expire dans 30 minutes.</p>
<p>Votre profil : <a href="{profileUrl}">{profileUrl}</a></p>
<p>Si vous n'avez pas créé de compte, ignorez cet email.</p>"#;

pub const WELCOME: &str = r#"<p>Bonjour {name},</p>
<p>Bienvenue ! Votre compte est prêt.</p>
<div style="text-align: center; margin: 30px 0;">
  <a href="{profileUrl}" style="background-color: #0077B5; color: white; padding: 14px 28px; text-decoration: none; border-radius: 30px; font-weight: bold;">Compléter mon profil</a>
</div>"#;

pub const PASSWORD_RESET_REQUEST: &str = r#"<p>Bonjour {name},</p>
<p>Nous avons reçu une demande de réinitialisation de votre mot de passe.</p>
<div style="text-align: center; margin: 30px 0;">
  <a href="{resetUrl}" style="background-color: #4CAF50; color: white; padding: 12px 20px; text-decoration: none; border-radius: 5px; font-weight: bold;">Réinitialiser le mot de passe</a>
</div>
<p>Ce lien expire dans 2 heures. Si vous n'êtes pas à l'origine de cette demande, ignorez cet email.</p>"#;

pub const PASSWORD_RESET_SUCCESS: &str = r#"<p>Bonjour {name},</p>
<p>Votre mot de passe a été réinitialisé avec succès.</p>
<p>Si vous n'êtes pas à l'origine de ce changement, contactez-nous immédiatement.</p>"#;

pub const CONNECTION_ACCEPTED: &str = r#"<p>Bonjour {senderName},</p>
<p><strong>{recipientName}</strong> a accepté votre demande de connexion.</p>
<div style="text-align: center; margin: 30px 0;">
  <a href="{profileUrl}" style="background-color: #0077B5; color: white; padding: 14px 28px; text-decoration: none; border-radius: 30px; font-weight: bold;">Voir le profil de {recipientName}</a>
</div>"#;

pub const COMMENT_NOTIFICATION: &str = r#"<p>Bonjour {recipientName},</p>
<p>{commenterName} a commenté votre publication :</p>
<div style="background-color: #f3f6f8; padding: 15px; border-radius: 8px; margin: 20px 0;">
  <p style="font-style: italic; margin: 0;">"{commentContent}"</p>
</div>
<div style="text-align: center; margin: 30px 0;">
  <a href="{postUrl}" style="background-color: #0077B5; color: white; padding: 14px 28px; text-decoration: none; border-radius: 30px; font-weight: bold;">Voir le commentaire</a>
</div>"#;

pub const MESSAGE_NOTIFICATION: &str = r#"<p>Bonjour {recipientName},</p>
<p><strong>{senderName}</strong> vous a envoyé un message :</p>
<p><em>"{content}"</em></p>
<div style="text-align: center; margin: 30px 0;">
  <a href="{inboxUrl}" style="background-color: #0077B5; color: white; padding: 14px 28px; text-decoration: none; border-radius: 30px; font-weight: bold;">Ouvrir la messagerie</a>
</div>"#;

/// Fill `template` and wrap it in the common layout
pub fn render(title: &str, template: &str, values: &[(&str, &str)]) -> String {
    let mut body = template.to_string();
    for (key, value) in values {
        body = body.replace(&format!("{{{}}}", key), &escape(value));
    }
    LAYOUT
        .replace("{title}", &escape(title))
        .replace("{body}", &body)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_fills_placeholders() {
        let html = render(
            "Vérification",
            VERIFICATION,
            &[
                ("name", "Ana"),
                ("verificationCode", "123456"),
                ("profileUrl", "http://localhost:5173/profile/ana1"),
            ],
        );
        assert!(html.contains("123456"));
        assert!(html.contains("Bonjour Ana"));
        assert!(html.contains("http://localhost:5173/profile/ana1"));
        assert!(!html.contains("{verificationCode}"));
    }

    #[test]
    fn test_render_escapes_user_content() {
        let html = render(
            "Commentaire",
            COMMENT_NOTIFICATION,
            &[("commentContent", "<script>alert(1)</script>")],
        );
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
