//! The flirt-trainer dialogue: a short linear chain of stages, each offering
//! a few replies that Ellie reacts to and scores.

use serde::Serialize;

/// Score bar ceiling; three scored stages of at most ten points.
pub const MAX_SCORE: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Good,
    Bad,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub text: &'static str,
    pub tone: Tone,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOption {
    pub text: &'static str,
    pub emoji: Option<&'static str>,
    pub reply: Reply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub id: &'static str,
    pub message: &'static str,
    pub options: &'static [GameOption],
    pub next: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub stages: &'static [Stage],
    pub initial: &'static str,
    pub final_stage: &'static str,
}

impl Scenario {
    pub fn stage(&self, id: &str) -> Option<&'static Stage> {
        self.stages.iter().find(|s| s.id == id)
    }
}

const fn reply(text: &'static str, tone: Tone, score: Option<i32>) -> Reply {
    Reply { text, tone, score }
}

const fn option(text: &'static str, emoji: Option<&'static str>, reply: Reply) -> GameOption {
    GameOption { text, emoji, reply }
}

static STAGES: [Stage; 5] = [
    Stage {
        id: "welcome",
        message: "Привет! Я — Ellie. Учу парней уверенно флиртовать 😘\nХочешь попробовать?",
        options: &[
            option(
                "Начать",
                None,
                reply("Отлично! Приступим к уроку флирта 😏", Tone::Good, None),
            ),
            option(
                "Не сейчас",
                None,
                reply("Ну что ж, буду ждать, когда решишься 😉", Tone::Neutral, None),
            ),
        ],
        next: Some("stage1"),
    },
    Stage {
        id: "stage1",
        message: "Представь: я стою у бара. Что скажешь первым?",
        options: &[
            option(
                "Привет, можно угостить тебя чем-то?",
                Some("🍸"),
                reply("Классика! Скромно, но со вкусом 🍸 7/10", Tone::Good, Some(7)),
            ),
            option(
                "Ты выглядишь опасно красиво…",
                Some("🔥"),
                reply("О-о-о, дерзкий 😏 А что дальше?", Tone::Good, Some(8)),
            ),
            option(
                "Ну привет, как дела, киска?",
                Some("😺"),
                reply("Киска?.. Серьёзно? 🙄 Попробуй ещё 😅", Tone::Bad, Some(3)),
            ),
        ],
        next: Some("stage2"),
    },
    Stage {
        id: "stage2",
        message: "Окей, ты пригласил меня на свидание. Куда ведёшь?",
        options: &[
            option(
                "В уютное кафе с видом на город",
                Some("🌆"),
                reply("Романтика 😍 А ты не так прост, как кажешься…", Tone::Good, Some(8)),
            ),
            option(
                "В караоке — разорвём зал!",
                Some("🎤"),
                reply(
                    "Обожаю смелых! Надеюсь, поёшь лучше, чем пишешь 😄",
                    Tone::Good,
                    Some(7),
                ),
            ),
            option(
                "Ко мне… смотреть Netflix 😉",
                Some("📺"),
                reply("Ох, мы только начали, а ты уже спешишь 😉", Tone::Bad, Some(4)),
            ),
        ],
        next: Some("stage3"),
    },
    Stage {
        id: "stage3",
        message: "Смотри, я делаю вид, что занята. Как привлечёшь моё внимание?",
        options: &[
            option(
                "Улыбнусь и подойду — просто",
                Some("😊"),
                reply(
                    "Хмм, прямолинейно! Но слишком очевидно. 6/10",
                    Tone::Neutral,
                    Some(6),
                ),
            ),
            option(
                "Сделаю вид, что тоже не замечаю",
                Some("🙈"),
                reply(
                    "Играешь в недотрогу? Интересная тактика! 7/10",
                    Tone::Good,
                    Some(7),
                ),
            ),
            option(
                "Напишу \"ты невероятна\" на салфетке и передам официанту",
                Some("✏️"),
                reply("Вау, это мило 😍 Ты умеешь удивить! 9/10", Tone::Good, Some(9)),
            ),
        ],
        next: Some("final"),
    },
    Stage {
        id: "final",
        message: "Отлично! Я впечатлена твоими навыками флирта. Пора применить их в реальной жизни! 💋\n\n Время идти и познакомиться с настоящими девушками!",
        options: &[],
        next: None,
    },
];

static ELLIE: Scenario = Scenario {
    stages: &STAGES,
    initial: "welcome",
    final_stage: "final",
};

pub fn ellie() -> &'static Scenario {
    &ELLIE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_reaches_final_stage() {
        let scenario = ellie();
        let mut id = scenario.initial;
        let mut visited = vec![id];
        while let Some(next) = scenario.stage(id).unwrap().next {
            id = next;
            visited.push(id);
        }
        assert_eq!(visited, vec!["welcome", "stage1", "stage2", "stage3", "final"]);
        assert!(scenario.stage(scenario.final_stage).unwrap().options.is_empty());
    }

    #[test]
    fn best_answers_stay_within_max_score() {
        let best: i32 = ellie()
            .stages
            .iter()
            .map(|s| s.options.iter().filter_map(|o| o.reply.score).max().unwrap_or(0))
            .sum();
        assert_eq!(best, 25);
        assert!(best <= MAX_SCORE);
    }
}
