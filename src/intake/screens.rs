//! Screen renderer: prompt texts, catalogs, and button layouts.
//!
//! Every function here is pure: the same record always renders the same
//! screen, which is what makes resuming after a restart reproduce exactly
//! what the user last saw.

use crate::channels::{Button, Controls, OutgoingMessage, ParseMode, UserId};

use super::event::{Choice, tokens};
use super::state::{CompletedSubmission, ConversationState, Step};

/// A renderable screen.
pub type Screen = OutgoingMessage;

/// Services the user can pick from.
pub const SERVICES: [&str; 5] = [
    "Определение стратегии",
    "Создание канала",
    "Контент-план",
    "Написание постов",
    "Анализ публикаций",
];

/// Engagement formats.
pub const FORMATS: [&str; 3] = [
    "Консультация",
    "+ Разбор и инструкции",
    "+ Сопровождение 1 месяц",
];

/// Alert shown when "done" is pressed with nothing selected.
pub const EMPTY_SELECTION_ALERT: &str = "Выберите хотя бы одну услугу!";

const SELECTED_PREFIX: &str = "✅ ";

/// Render the screen for the record's current step.
pub fn render(state: &ConversationState) -> Screen {
    match state.step {
        Step::AwaitingInstructionAck => instructions(),
        Step::AwaitingName if state.name_retry => name_retry_prompt(),
        Step::AwaitingName => name_prompt(),
        Step::AwaitingNameConfirmation => {
            name_confirmation(state.pending_name.as_deref().unwrap_or_default())
        }
        Step::AwaitingServices => services(
            state.submission.name.as_deref().unwrap_or_default(),
            &state.selected_services,
        ),
        Step::AwaitingFormat => format_prompt(),
        Step::AwaitingContact => contact_prompt(),
        Step::AwaitingOrderConfirmation => preview(state),
    }
}

pub fn instructions() -> Screen {
    let text = "📚 <b>Инструкция по работе с ботом</b>\n\n\
        1. <b>Запуск</b>: нажмите /start или откройте диалог с ботом\n\
        2. <b>Ввод данных</b>: укажите имя, выберите услуги и формат\n\
        3. <b>Контактные данные</b>: телефон, email или Telegram-ник\n\
        4. <b>Подтверждение</b>: проверьте и отправьте заявку\n\n\
        🔹 <i>Все данные конфиденциальны</i>\n\
        🔹 <i>Можно прервать диалог командой /cancel</i>\n\n\
        Нажмите кнопку <b>Продолжить</b> чтобы начать👇";

    Screen::plain(text)
        .with_parse_mode(ParseMode::Html)
        .with_controls(Controls::Inline(vec![vec![Button::new(
            "➡️ Продолжить",
            Choice::Continue.token(),
        )]]))
}

pub fn name_prompt() -> Screen {
    Screen::plain(
        "👋 Приветствую! Я помогу оформить заявку на услуги.\n\n\
         Ответьте на 3 вопроса, и я всё оформлю.\n\n\
         📌 Все данные конфиденциальны.\n\n\
         Как Ваше имя?",
    )
    .with_controls(Controls::RemoveKeyboard)
}

pub fn name_retry_prompt() -> Screen {
    Screen::plain("Напишите, пожалуйста, Ваше имя ещё раз:")
}

pub fn name_confirmation(candidate: &str) -> Screen {
    Screen::plain(format!(
        "Вы уверены, что имя '{candidate}' написано правильно?"
    ))
    .with_controls(Controls::Inline(vec![
        vec![Button::new("✅ Да, всё верно", tokens::NAME_YES)],
        vec![Button::new("✏️ Исправить имя", tokens::NAME_NO)],
    ]))
}

/// Service picker: two buttons per row, selected ones marked, then "done".
pub fn services(name: &str, selected: &[String]) -> Screen {
    let mut rows: Vec<Vec<Button>> = Vec::new();
    for (i, service) in SERVICES.iter().enumerate() {
        let prefix = if selected.iter().any(|s| s == service) {
            SELECTED_PREFIX
        } else {
            ""
        };
        let button = Button::new(
            format!("{prefix}{service}"),
            Choice::ToggleService(i).token(),
        );
        if i % 2 == 0 {
            rows.push(vec![button]);
        } else if let Some(row) = rows.last_mut() {
            row.push(button);
        }
    }
    rows.push(vec![Button::new("➡️ Готово", tokens::SERVICES_DONE)]);

    Screen::plain(format!(
        "{name}, выберите услуги:\n(можно выбрать несколько)\n\nи нажмите на кнопку Готово"
    ))
    .with_controls(Controls::Inline(rows))
}

pub fn format_prompt() -> Screen {
    let rows = FORMATS
        .iter()
        .enumerate()
        .map(|(i, f)| vec![Button::new(*f, Choice::Format(i).token())])
        .collect();

    Screen::plain(
        "Выберите формат сотрудничества:\n\n\
         Консультация - бесплатная консультация,\n\
         + Разбор и инструкции - консультация, разбор канала и инструкции,\n\
         + Сопровождение 1 месяц - предыдущий пункт и сопровождение 1 месяц.",
    )
    .with_controls(Controls::Inline(rows))
}

pub fn contact_prompt() -> Screen {
    Screen::plain("📩 Как с Вами удобнее связаться?\n(телефон, email или Telegram username):")
        .with_controls(Controls::RemoveKeyboard)
}

/// Full preview of the collected fields with submit/cancel buttons.
pub fn preview(state: &ConversationState) -> Screen {
    let sub = &state.submission;
    let text = format!(
        "📋 Предварительный просмотр вашей заявки:\n\n\
         ▪ Имя: {}\n\
         ▪ Услуги: {}\n\
         ▪ Формат: {}\n\
         ▪ Контакты: {}\n\n\
         Проверьте правильность данных в заявке. Вы можете отправить Заявку или отменить её.",
        sub.name.as_deref().unwrap_or_default(),
        sub.services_line(),
        sub.format.as_deref().unwrap_or_default(),
        sub.contact.as_deref().unwrap_or_default(),
    );

    Screen::plain(text).with_controls(Controls::Inline(vec![
        vec![Button::new("✅ Отправить заявку", tokens::SUBMIT)],
        vec![Button::new("❌ Отменить заявку", tokens::CANCEL)],
    ]))
}

/// Receipt left on the requester's screen after submission.
pub fn receipt(sub: &CompletedSubmission) -> Screen {
    Screen::plain(format!(
        "📋 Ваша заявка:\n\
         ▪ Имя: {}\n\
         ▪ Услуги: {}\n\
         ▪ Формат: {}\n\
         ▪ Контакты: {}\n\n\
         ✅ Заявка успешно отправлена!\n\
         Я свяжусь с вами в течение 2 часов.\n\n\
         Спасибо за обращение! 🤝",
        sub.name,
        sub.services_line(),
        sub.format,
        sub.contact,
    ))
}

/// Operator notification with a deep link back to the requester.
pub fn operator_notification(sub: &CompletedSubmission, requester: UserId) -> Screen {
    Screen::plain(format!(
        "📌 Новая заявка:\n\
         👤 Имя: {}\n\
         🛠 Услуги: {}\n\
         📋 Формат: {}\n\
         📞 Контакты: {}\n\
         🔗 Ссылка: [Написать](tg://user?id={requester})",
        sub.name,
        sub.services_line(),
        sub.format,
        sub.contact,
    ))
    .with_parse_mode(ParseMode::Markdown)
}

/// Shown when the preview's cancel button is pressed.
pub fn order_cancelled() -> Screen {
    Screen::plain(
        "❌ Заявка отменена. Все данные удалены.\n\n\
         Чтобы начать новую заявку, нажмите /start",
    )
    .with_controls(Controls::RemoveKeyboard)
}

/// Shown on `/cancel`.
pub fn dialog_aborted() -> Screen {
    Screen::plain("Диалог прерван. Нажмите /start чтобы начать заново.")
        .with_controls(Controls::RemoveKeyboard)
}

pub fn dispatch_failed() -> Screen {
    Screen::plain("⚠️ Произошла ошибка при отправке заявки. Пожалуйста, попробуйте позже.")
}
