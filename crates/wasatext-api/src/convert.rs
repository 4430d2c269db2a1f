//! Storage rows to wire models.

use wasatext_db::{
    AddMemberOutcome, ConversationRow, ConversationSummary, MemberRow, MessageContent, MessageRow,
    MessageView, UserRow,
};
use wasatext_types::api::AddMemberStatus;
use wasatext_types::models::{Conversation, Member, Message, MessagePreview, Reaction, User};

pub fn user(row: UserRow) -> User {
    User {
        id: row.id,
        name: row.name,
        photo_url: row.photo_url,
    }
}

pub fn member(row: MemberRow) -> Member {
    Member {
        user_id: row.user_id,
        name: row.name,
        photo_url: row.photo_url,
        is_admin: row.is_admin,
    }
}

pub fn conversation(row: ConversationRow, members: Vec<MemberRow>) -> Conversation {
    Conversation {
        id: row.id,
        name: row.name,
        is_group: row.kind.is_group(),
        last_message_id: row.last_message_id,
        photo_url: row.photo_url,
        members: members.into_iter().map(member).collect(),
        last_message: None,
    }
}

pub fn summary(summary: ConversationSummary) -> Conversation {
    let mut out = conversation(summary.conversation, summary.members);
    out.last_message = summary.last_message.map(preview);
    out
}

fn preview(row: MessageRow) -> MessagePreview {
    MessagePreview {
        id: row.id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        is_photo: row.content.is_photo(),
        content: row.content.as_str().to_string(),
        timestamp: row.timestamp,
    }
}

pub fn message(view: MessageView) -> Message {
    let row = view.message;
    let (content, photo_url) = match row.content {
        MessageContent::Text(text) => (Some(text), None),
        MessageContent::Photo(url) => (None, Some(url)),
    };

    Message {
        id: row.id,
        conversation_id: row.conversation_id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        content,
        photo_url,
        timestamp: row.timestamp,
        reply_to_id: row.reply_to_id,
        is_forwarded: row.is_forwarded,
        reactions: view
            .reactions
            .into_iter()
            .map(|r| Reaction {
                user_id: r.user_id,
                emoji: r.reaction,
            })
            .collect(),
    }
}

pub fn add_member_status(outcome: AddMemberOutcome) -> AddMemberStatus {
    match outcome {
        AddMemberOutcome::Added => AddMemberStatus::Added,
        AddMemberOutcome::AlreadyMember => AddMemberStatus::AlreadyMember,
        AddMemberOutcome::UserNotFound => AddMemberStatus::UserNotFound,
    }
}
