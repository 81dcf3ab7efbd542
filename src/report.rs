//! Plain-text listings printed by the CLI.
//!
//! Everything that came from a feed or a user passes through
//! [`single_line`] first so a hostile title cannot inject terminal escapes.

use std::io::{self, Write};

use chrono::SecondsFormat;

use crate::ingest::IngestEvent;
use crate::storage::{FeedFollow, FeedPost, FeedWithCreator, User};
use crate::util::single_line;

pub fn write_users(out: &mut impl Write, users: &[User], current: Option<&str>) -> io::Result<()> {
    for user in users {
        if Some(user.name.as_str()) == current {
            writeln!(out, "* {} (current)", single_line(&user.name))?;
        } else {
            writeln!(out, "* {}", single_line(&user.name))?;
        }
    }
    Ok(())
}

pub fn write_feeds(out: &mut impl Write, feeds: &[FeedWithCreator]) -> io::Result<()> {
    if feeds.is_empty() {
        writeln!(out, "No feeds registered.")?;
        return Ok(());
    }
    for feed in feeds {
        writeln!(out, "* {}", single_line(&feed.name))?;
        writeln!(out, "  URL:     {}", single_line(&feed.url))?;
        writeln!(out, "  Added by {}", single_line(&feed.user_name))?;
    }
    Ok(())
}

pub fn write_follow(out: &mut impl Write, follow: &FeedFollow) -> io::Result<()> {
    writeln!(
        out,
        "{} now follows {}",
        single_line(&follow.user_name),
        single_line(&follow.feed_name)
    )
}

pub fn write_following(out: &mut impl Write, user: &str, feeds: &[String]) -> io::Result<()> {
    if feeds.is_empty() {
        writeln!(out, "{} follows no feeds.", single_line(user))?;
        return Ok(());
    }
    writeln!(out, "{} follows:", single_line(user))?;
    for name in feeds {
        writeln!(out, "* {}", single_line(name))?;
    }
    Ok(())
}

/// Posts with their feed, published time (RFC 3339, UTC) and link.
pub fn write_posts(out: &mut impl Write, posts: &[FeedPost]) -> io::Result<()> {
    if posts.is_empty() {
        writeln!(out, "No posts yet.")?;
        return Ok(());
    }
    for post in posts {
        writeln!(
            out,
            "{} from {}",
            post.published_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            single_line(&post.feed_name)
        )?;
        writeln!(out, "--- {} ---", single_line(&post.title))?;
        if !post.description.is_empty() {
            writeln!(out, "    {}", single_line(&post.description))?;
        }
        writeln!(out, "Link: {}", single_line(&post.url))?;
        writeln!(out, "=====================================")?;
    }
    Ok(())
}

pub fn write_event(out: &mut impl Write, event: &IngestEvent) -> io::Result<()> {
    writeln!(
        out,
        "[{}] {} <{}>",
        single_line(&event.feed_name),
        single_line(&event.title),
        single_line(&event.url)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_users_marks_current() {
        let now = Utc::now();
        let users: Vec<User> = ["alice", "bob"]
            .iter()
            .map(|name| User {
                id: Uuid::new_v4(),
                name: name.to_string(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let out = render(|buf| write_users(buf, &users, Some("bob")));
        assert_eq!(out, "* alice\n* bob (current)\n");
    }

    #[test]
    fn test_posts_use_rfc3339_and_strip_escapes() {
        let posts = vec![FeedPost {
            feed_name: "News".into(),
            title: "Evil\x1b[2J title\n".into(),
            url: "http://x/1".into(),
            description: String::new(),
            published_at: Utc.with_ymd_and_hms(2006, 1, 2, 22, 4, 5).unwrap(),
        }];

        let out = render(|buf| write_posts(buf, &posts));
        assert!(out.starts_with("2006-01-02T22:04:05Z from News\n"));
        assert!(out.contains("--- Evil title ---"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_empty_listings() {
        assert_eq!(render(|buf| write_posts(buf, &[])), "No posts yet.\n");
        assert_eq!(render(|buf| write_feeds(buf, &[])), "No feeds registered.\n");
        assert_eq!(
            render(|buf| write_following(buf, "alice", &[])),
            "alice follows no feeds.\n"
        );
    }

    #[test]
    fn test_event_line() {
        let event = IngestEvent {
            feed_name: "News".into(),
            title: "A".into(),
            url: "http://x/1".into(),
        };
        assert_eq!(render(|buf| write_event(buf, &event)), "[News] A <http://x/1>\n");
    }
}
