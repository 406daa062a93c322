use crate::{AppState, Effect, Msg, SessionState};

pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let mut effects = Vec::new();

    match msg {
        Msg::BookmarksLoaded(bookmarks) => {
            // A batch in flight keeps its rows until it finishes.
            if matches!(
                state.session(),
                SessionState::Running | SessionState::Cancelling
            ) {
                return (state, effects);
            }
            let urls = state.load(bookmarks);
            if urls.is_empty() {
                state.set_session(SessionState::Finished);
            } else {
                state.set_session(SessionState::Running);
                effects.push(Effect::Enrich { urls });
            }
        }
        Msg::Progress { url, stage } => {
            state.apply_progress(&url, stage);
        }
        Msg::ResultReady(preview) => {
            state.apply_result(preview);
            if state.all_resolved() {
                state.set_session(SessionState::Finished);
            }
        }
        Msg::CancelClicked => {
            if state.session() == SessionState::Running {
                state.set_session(SessionState::Cancelling);
                effects.push(Effect::Cancel);
            }
        }
    }

    (state, effects)
}
