//! Whole sessions: opening, classification, the turn loop and its limits.

use aidm_core::gateway::{GenerationError, RetryPolicy, RetryingGenerator};
use aidm_core::persist::SaveStore;
use aidm_core::rules::GameRule;
use aidm_core::session::{Session, SessionConfig, SessionEnd, SessionError, GAME_OVER};
use aidm_core::testing::{seeded_story, FixedDice, MockGenerator, ScriptedTerminal, TestHarness};

const WORLD: &str = "The realm of Vael is locked in a winter that will not end.\n\n\
Character 1\n\
Classtype: Ranger\n\
Race: Human\n\
Strength: 3\n\
Intelligence: 2\n\
Speed: 4\n\
Charisma: 1\n\
Alignment: neutral good\n\
Description: A tracker.\n\n\
Character 2\n\
Classtype: Wizard\n\
Race: Elf\n\
Strength: 1\n\
Intelligence: 6\n\
Speed: 2\n\
Charisma: 3\n\
Alignment: lawful neutral\n\
Description: A scholar.";

fn config(dir: &tempfile::TempDir) -> SessionConfig {
    SessionConfig::default().with_save_dir(dir.path())
}

#[tokio::test]
async fn test_new_game_picks_roster_character() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond([
        WORLD,
        "You wake in a snowed-in cabin.",
        "None",
        "The wind howls outside.",
    ]);
    h.input(["Mira", "7", "2", "", "look around"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    let end = session.run(None).await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    assert!(session
        .story_mut()
        .rule_mut()
        .update("attributes", "Luck")
        .is_err());
    let story = session.story();
    assert_eq!(story.player().name, "Mira");
    assert_eq!(story.player().classtype, "Wizard");
    assert_eq!(story.player().attribute("Intelligence"), 6);
    assert_eq!(
        story.history()[0],
        "The realm of Vael is locked in a winter that will not end."
    );
    assert_eq!(story.latest_player_action(), Some("look around"));
    assert_eq!(story.latest_event(), Some("The wind howls outside."));

    let transcript = h.terminal.transcript();
    assert!(transcript.contains("Invalid input. Please enter a number from 0 to 4."));
    assert!(transcript.contains("You have created your character:"));
}

#[tokio::test]
async fn test_new_game_custom_character() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond([
        "A quiet realm of rivers and mills.",
        "Classtype: Bard\nRace: Halfling\nStrength: 1\nIntelligence: 3\nSpeed: 12\nCharisma: 5\n\
         Alignment: chaotic good\nDescription: Never without a lute.",
        "You tune your lute at the inn.",
        "None",
        "The crowd gathers.",
    ]);
    h.input(["Pip", "0", "a cheerful halfling bard", "", "play a song"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    session.run(None).await.unwrap();

    let player = session.story().player();
    assert_eq!(player.classtype, "Bard");
    // Clamped to the default maximum of 6.
    assert_eq!(player.attribute("Speed"), 6);
    assert!(h
        .gateway
        .prompts()
        .iter()
        .any(|p| p.contains("a cheerful halfling bard")));
}

#[tokio::test]
async fn test_rule_change_before_naming_shapes_the_world() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond(["A realm.", "Classtype: Thief\nRace: Human\nLuck: 4\nWits: 2\nAlignment: neutral", "Begin."]);
    h.input([
        "/rule attributes Luck, Wits",
        "/rule dice_sides 12",
        "Rook",
        "0",
        "a lucky thief",
        "",
    ]);

    let mut session = h.session(GameRule::default(), config(&dir));
    let end = session.run(None).await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    assert_eq!(session.story().rule().attributes(), ["Luck", "Wits"]);
    assert_eq!(session.story().player().attribute("Luck"), 4);
    let prompts = h.gateway.prompts();
    assert!(prompts[0].contains("12-sided"));
    assert!(prompts[0].contains("Luck"));
}

#[tokio::test]
async fn test_resume_saved_game_and_trade_priority() {
    let dir = tempfile::tempdir().unwrap();
    SaveStore::new(dir.path())
        .save("hero", &seeded_story(GameRule::default()))
        .await
        .unwrap();

    let h = TestHarness::new();
    h.respond([
        "Snow keeps falling on the watchtower.",
        "This could be a Battle, or maybe a Trade.",
        "A peddler waves from the road.",
        "The peddler takes your coin and hands you a tonic.\nYou lose: Golds 10\nYou gain: HP 5",
        "None",
        "The tonic warms you.",
    ]);
    h.input(["/help", "/read hero", "approach the peddler", "buy a tonic", "drink it"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    let end = session.run(None).await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    let player = session.story().player();
    assert_eq!(player.name, "Aldric");
    assert_eq!(player.golds, 90);
    assert_eq!(player.hp, 105);
    assert!(h.terminal.transcript().contains("Game loaded from 'hero'."));
}

#[tokio::test]
async fn test_run_with_load_argument() {
    let dir = tempfile::tempdir().unwrap();
    SaveStore::new(dir.path())
        .save("hero", &seeded_story(GameRule::default()))
        .await
        .unwrap();

    let h = TestHarness::new();
    h.respond(["Snow keeps falling on the watchtower.", "None", "The stairs are icy."]);
    h.input(["climb the tower"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    let end = session.run(Some("hero")).await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    assert_eq!(session.story().latest_player_action(), Some("climb the tower"));
    let prompts = h.gateway.prompts();
    assert!(prompts[0].contains("The kingdom of Vael lies under a long winter."));
}

#[tokio::test]
async fn test_run_with_missing_save_fails() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    let mut session = h.session(GameRule::default(), config(&dir));

    assert!(matches!(
        session.run(Some("ghost")).await,
        Err(SessionError::Persistence(_))
    ));
}

#[tokio::test]
async fn test_unclassifiable_turns_give_up() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond(["maybe", "hard to say", "who knows"]);

    let mut session = h.session(GameRule::default(), config(&dir).with_max_failed_turns(3));
    *session.story_mut() = seeded_story(GameRule::default());

    match session.play().await {
        Err(SessionError::TooManyFailures { failures, .. }) => assert_eq!(failures, 3),
        other => panic!("expected TooManyFailures, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_turn_is_retried_from_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond([
        "maybe",
        "None",
        "The watchtower door creaks open.",
        "None",
        "Dust swirls in the dark.",
    ]);
    h.input(["step inside"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    *session.story_mut() = seeded_story(GameRule::default());

    let end = session.play().await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    assert!(h.terminal.transcript().contains("The story pauses; trying again."));
    assert_eq!(session.story().latest_player_action(), Some("step inside"));
}

#[tokio::test]
async fn test_defeat_in_battle_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new().with_dice(FixedDice::always(1));
    h.respond([
        "Battle",
        "Enemy name: Ice Troll\nStrength: 6\nIntelligence: 1\nSpeed: 1\nCharisma: 0\nHP: 200",
        "Option: Swing your axe (Strength)\nRoll: Beat the troll",
        "The troll flattens you.\nDamage: 150",
    ]);
    h.input(["attack the troll"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    *session.story_mut() = seeded_story(GameRule::default());

    let end = session.play().await.unwrap();

    assert_eq!(end, SessionEnd::PlayerDefeated);
    assert!(h.terminal.transcript().ends_with(GAME_OVER));
    assert_eq!(session.story().player().hp, -50);
}

#[tokio::test]
async fn test_fatal_casual_event_ends_session() {
    let dir = tempfile::tempdir().unwrap();
    let h = TestHarness::new();
    h.respond([
        "Casual Event",
        "An avalanche rumbles down the slope.",
        "The snow buries you.\nPenalty: HP -120",
    ]);
    h.input(["stand my ground", "dig out"]);

    let mut session = h.session(GameRule::default(), config(&dir));
    *session.story_mut() = seeded_story(GameRule::default());

    let end = session.play().await.unwrap();

    assert_eq!(end, SessionEnd::PlayerDefeated);
    assert!(h.terminal.transcript().ends_with(GAME_OVER));
    assert_eq!(h.terminal.remaining_inputs(), 1);
}

#[tokio::test]
async fn test_transient_failures_are_retried_by_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockGenerator::new(Vec::<String>::new());
    mock.fail(GenerationError::Transient("overloaded".into()));
    mock.respond("None");
    mock.respond("The snow stops.");
    mock.respond("None");
    mock.respond("Stars appear.");
    let terminal = ScriptedTerminal::new(["look up"]);

    let mut session = Session::new(
        Box::new(RetryingGenerator::new(mock.clone(), RetryPolicy::immediate(3))),
        Box::new(terminal.clone()),
        Box::new(FixedDice::always(1)),
        GameRule::default(),
        config(&dir),
    );
    *session.story_mut() = seeded_story(GameRule::default());

    let end = session.play().await.unwrap();

    assert_eq!(end, SessionEnd::InputClosed);
    assert!(!terminal.transcript().contains("[ERROR]"));
    assert_eq!(session.story().latest_event(), Some("Stars appear."));
    assert_eq!(session.story().latest_player_action(), Some("look up"));
}
