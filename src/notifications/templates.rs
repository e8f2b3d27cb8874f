use tera::{Context, Tera};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template render error: {0}")]
    Render(#[from] tera::Error),
}

/// HTML email renderer. All templates are embedded; the shell carries the
/// shared layout and each mail type fills the badge/content blocks.
pub struct Templates {
    tera: Tera,
}

const SHELL: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{% block headline %}{% endblock headline %}</title>
  <style>
    body{margin:0;background:#f6f7f9;color:#161823;font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,"Helvetica Neue",Arial,"Noto Sans","PingFang SC","Hiragino Sans GB","Microsoft YaHei",sans-serif;}
    .container{max-width:600px;margin:24px auto;padding:0 16px;}
    .card{background:#fff;border-radius:14px;box-shadow:0 2px 8px rgba(0,0,0,0.06);overflow:hidden}
    .header{padding:18px 20px;background:#0b5fff;color:#fff;display:flex;align-items:center;justify-content:space-between}
    .brand{font-weight:600;font-size:16px;letter-spacing:.2px}
    .headline{font-size:14px;opacity:.9}
    .content{padding:22px 20px;font-size:14px;line-height:1.7;color:#222}
    .badge{display:inline-block;padding:4px 10px;border-radius:999px;font-size:12px;font-weight:600}
    .badge--ok{background:#e8f4ff;color:#0b5fff}
    .badge--warn{background:#ffeeee;color:#d93025}
    .section{margin-top:10px}
    .kv{margin:6px 0}
    .kv b{display:inline-block;width:92px;color:#555}
    .footer{padding:16px 20px;border-top:1px solid #f0f2f5;color:#666;font-size:12px;background:#fafbfc}
    a{color:#0b5fff;text-decoration:none}
  </style>
</head>
<body>
  <div class="container">
    <div class="card">
      <div class="header">
        <div class="brand">{{ site_name }}</div>
        <div class="headline">{% block headline2 %}{% endblock headline2 %}</div>
      </div>
      <div class="content">
        {% block content %}{% endblock content %}
      </div>
      <div class="footer">{% block footer %}{% endblock footer %}</div>
    </div>
  </div>
</body>
</html>"#;

const STATUS_CHANGE: &str = r#"{% extends "shell.html" %}
{% block headline %}状态变更{% endblock headline %}
{% block headline2 %}状态变更{% endblock headline2 %}
{% block content %}
{% if online %}<span class="badge badge--ok">服务恢复</span>
<div class="section">站点已恢复在线状态。</div>
{% else %}<span class="badge badge--warn">服务离线</span>
<div class="section">站点当前出现异常，请关注。</div>
{% endif %}
<div class="section">
  <div class="kv"><b>站点名称</b><a href="{{ monitor_url }}" target="_blank" rel="noopener">{{ monitor_name }}</a></div>
  <div class="kv"><b>状态码</b>{{ status_code }}</div>
  <div class="kv"><b>错误信息</b>{{ error }}</div>
  <div class="kv"><b>时间</b>{{ at }}</div>
</div>
{% endblock content %}
{% block footer %}这是一封系统自动邮件。你可以在通知设置中调整事件与收件人。{% endblock footer %}"#;

const SSL_EXPIRY: &str = r#"{% extends "shell.html" %}
{% block headline %}证书到期提醒{% endblock headline %}
{% block headline2 %}证书到期提醒{% endblock headline2 %}
{% block content %}
<span class="badge badge--warn">证书到期提醒</span>
<div class="section">站点的 SSL 证书即将到期，请尽快更新。</div>
<div class="section">
  <div class="kv"><b>站点名称</b><a href="{{ monitor_url }}" target="_blank" rel="noopener">{{ monitor_name }}</a></div>
  <div class="kv"><b>剩余天数</b>{{ days_left }}</div>
  <div class="kv"><b>到期时间</b>{{ expires_at }}</div>
  <div class="kv"><b>检测时间</b>{{ at }}</div>
</div>
{% endblock content %}
{% block footer %}这是一封系统自动邮件。你可以在通知设置中调整提前提醒天数与收件人。{% endblock footer %}"#;

const TEST_MAIL: &str = r#"{% extends "shell.html" %}
{% block headline %}测试通知{% endblock headline %}
{% block headline2 %}测试通知{% endblock headline2 %}
{% block content %}
<span class="badge badge--ok">{{ title }}</span>
<div class="section">这是一条测试邮件，用于验证通知链路。</div>
<div class="section">
  <div class="kv"><b>站点名称</b><a href="{{ monitor_url }}" target="_blank" rel="noopener">{{ monitor_name }}</a></div>
  <div class="kv"><b>类型</b>{{ event_label }}</div>
  <div class="kv"><b>时间</b>{{ at }}</div>
</div>
{% endblock content %}
{% block footer %}如果未收到，请检查 SMTP 配置与收件箱垃圾邮件。{% endblock footer %}"#;

const SUBSCRIBE_VERIFY: &str = r#"{% extends "shell.html" %}
{% block headline %}订阅验证{% endblock headline %}
{% block headline2 %}订阅验证{% endblock headline2 %}
{% block content %}
<span class="badge badge--ok">订阅验证</span>
<div class="section">你正在订阅站点「{{ monitor_name }}」的通知，点击下方链接完成验证（24 小时内有效）。</div>
<div class="section"><a href="{{ verify_url }}" target="_blank" rel="noopener">确认订阅</a></div>
{% endblock content %}
{% block footer %}如果这不是你的操作，忽略本邮件即可。{% endblock footer %}"#;

const VERIFY_SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html lang="zh-CN">
<head><meta charset="utf-8" /><title>订阅成功</title></head>
<body style="font-family:sans-serif;text-align:center;padding-top:80px;background:#f6f7f9">
  <h2>订阅验证成功</h2>
  <p>{{ site_name }}将在站点状态变化时向你发送邮件通知。</p>
</body>
</html>"#;

impl Templates {
    pub fn new() -> Self {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("shell.html", SHELL),
            ("status_change.html", STATUS_CHANGE),
            ("ssl_expiry.html", SSL_EXPIRY),
            ("test.html", TEST_MAIL),
            ("subscribe_verify.html", SUBSCRIBE_VERIFY),
            ("verify_success.html", VERIFY_SUCCESS_PAGE),
        ])
        .expect("embedded templates must parse");
        Templates { tera }
    }

    pub fn body_status_change(
        &self,
        site_name: &str,
        monitor_name: &str,
        monitor_url: &str,
        online: bool,
        at: &str,
        status_code: i32,
        error: &str,
    ) -> Result<String, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("site_name", site_name);
        ctx.insert("monitor_name", monitor_name);
        ctx.insert("monitor_url", monitor_url);
        ctx.insert("online", &online);
        ctx.insert("at", at);
        ctx.insert("status_code", &status_code);
        ctx.insert("error", error);
        Ok(self.tera.render("status_change.html", &ctx)?)
    }

    pub fn body_ssl_expiry(
        &self,
        site_name: &str,
        monitor_name: &str,
        monitor_url: &str,
        days_left: i32,
        expires_at: &str,
        at: &str,
    ) -> Result<String, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("site_name", site_name);
        ctx.insert("monitor_name", monitor_name);
        ctx.insert("monitor_url", monitor_url);
        ctx.insert("days_left", &days_left);
        ctx.insert("expires_at", expires_at);
        ctx.insert("at", at);
        Ok(self.tera.render("ssl_expiry.html", &ctx)?)
    }

    pub fn body_test(
        &self,
        site_name: &str,
        monitor_name: &str,
        monitor_url: &str,
        event: &str,
        at: &str,
    ) -> Result<String, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("site_name", site_name);
        ctx.insert("monitor_name", monitor_name);
        ctx.insert("monitor_url", monitor_url);
        ctx.insert("title", subject_test_title(event));
        ctx.insert("event_label", event_label(event));
        ctx.insert("at", at);
        Ok(self.tera.render("test.html", &ctx)?)
    }

    pub fn body_subscribe_verify(
        &self,
        site_name: &str,
        monitor_name: &str,
        verify_url: &str,
    ) -> Result<String, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("site_name", site_name);
        ctx.insert("monitor_name", monitor_name);
        ctx.insert("verify_url", verify_url);
        Ok(self.tera.render("subscribe_verify.html", &ctx)?)
    }

    pub fn page_verify_success(&self, site_name: &str) -> Result<String, TemplateError> {
        let mut ctx = Context::new();
        ctx.insert("site_name", site_name);
        Ok(self.tera.render("verify_success.html", &ctx)?)
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

pub fn subject_status_change(online: bool, monitor_name: &str, site_name: &str) -> String {
    let title = if online { "服务恢复" } else { "服务离线" };
    if site_name.trim().is_empty() {
        format!("{title} · {monitor_name}")
    } else {
        format!("{title} · {monitor_name} ｜ {site_name}")
    }
}

pub fn subject_ssl_expiry(monitor_name: &str, site_name: &str) -> String {
    if site_name.trim().is_empty() {
        format!("证书到期提醒 · {monitor_name}")
    } else {
        format!("证书到期提醒 · {monitor_name} ｜ {site_name}")
    }
}

pub fn subject_test(event: &str, monitor_name: &str, site_name: &str) -> String {
    let title = subject_test_title(event);
    if site_name.trim().is_empty() {
        format!("{title} · {monitor_name}")
    } else {
        format!("{title} · {monitor_name} ｜ {site_name}")
    }
}

pub fn subject_subscribe_verify(monitor_name: &str, site_name: &str) -> String {
    format!("订阅验证 · {monitor_name} ｜ {site_name}")
}

fn subject_test_title(event: &str) -> &'static str {
    match event {
        "online" => "测试 · 服务恢复",
        "offline" => "测试 · 服务离线",
        "ssl_expiry" => "测试 · 证书到期",
        _ => "测试通知",
    }
}

fn event_label(event: &str) -> &'static str {
    match event.trim().to_ascii_lowercase().as_str() {
        "online" => "在线",
        "offline" => "离线",
        "ssl_expiry" => "证书到期",
        _ => "未知",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_change_body_renders_both_directions() {
        let t = Templates::new();
        let up = t
            .body_status_change("监控站", "API", "https://api.example.com", true, "now", 200, "")
            .unwrap();
        assert!(up.contains("服务恢复"));
        assert!(up.contains("https://api.example.com"));

        let down = t
            .body_status_change("监控站", "API", "https://api.example.com", false, "now", 502, "bad gateway")
            .unwrap();
        assert!(down.contains("服务离线"));
        assert!(down.contains("bad gateway"));
    }

    #[test]
    fn ssl_body_includes_days_left() {
        let t = Templates::new();
        let html = t
            .body_ssl_expiry("监控站", "API", "https://api.example.com", 10, "2026-09-01T00:00:00Z", "now")
            .unwrap();
        assert!(html.contains("10"));
        assert!(html.contains("证书到期提醒"));
    }

    #[test]
    fn subjects_follow_site_name_presence() {
        assert_eq!(subject_status_change(true, "API", ""), "服务恢复 · API");
        assert_eq!(
            subject_status_change(false, "API", "监控站"),
            "服务离线 · API ｜ 监控站"
        );
        assert_eq!(subject_ssl_expiry("API", ""), "证书到期提醒 · API");
        assert_eq!(subject_test("bogus", "API", ""), "测试通知 · API");
    }

    #[test]
    fn verify_mail_carries_the_link() {
        let t = Templates::new();
        let html = t
            .body_subscribe_verify("监控站", "API", "https://mon.example.com/api/subscriptions/verify?token=abc")
            .unwrap();
        assert!(html.contains("token=abc"));
    }
}
