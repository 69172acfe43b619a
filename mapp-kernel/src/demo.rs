//! Données de démonstration servies aux visiteurs anonymes ou pour une salle inconnue.

use serde_json::{json, Value};

fn demo_friends() -> Value {
    json!([
        { "name": "gryffindor", "room_key": "godric's-hollow", "room_name": "Godric's Hollow" },
        { "name": "moony", "room_key": "common-room", "room_name": "Common Room", "here": true },
        { "name": "padfoot", "room_key": "common-room", "room_name": "Common Room", "here": true },
        { "name": "prongs", "room_key": "common-room", "room_name": "Common Room", "here": true },
        { "name": "wormtail", "room_key": "common-room", "room_name": "Common Room", "here": true },
    ])
}

pub fn demo_payload() -> Value {
    json!({
        "friends": demo_friends(),
        "friends_here_count": 4,
        "friends_elsewhere_count": 1,
        "room": { "name": "Mapp Demo", "key": "demo" },
        "rows": [
            [
                {},
                { "hostname": "dish", "status": "offline" },
                { "hostname": "paulajennings", "status": "online" },
                {}, {}, {}, {}, {}
            ],
            [
                { "hostname": "dent", "status": "online" },
                { "hostname": "prefect", "status": "online" },
                { "hostname": "slartibartfast", "user": " ", "friend": "moony" },
                { "hostname": "random", "user": " ", "friend": "wormtail" },
                { "hostname": "colin", "status": "offline" },
                {},
                { "hostname": "marvin", "status": "online" },
                { "hostname": "vogon", "status": "online" }
            ],
            [
                { "hostname": "beeblebrox", "user": " ", "friend": "padfoot" },
                { "hostname": "trillian", "user": " " },
                { "hostname": "agrajag", "status": "unknown" },
                { "hostname": "krikkit", "user": " " },
                { "hostname": "almightybob", "status": "online" },
                {},
                { "hostname": "jynnan", "user": " " },
                { "hostname": "tonyx", "status": "offline" }
            ],
            [
                {}, {}, {},
                { "hostname": "eddie", "status": "offline" },
                { "hostname": "fenchurch", "user": " " },
                {}, {}, {}
            ],
            [
                {}, {}, {},
                { "hostname": "anangus", "status": "offline" },
                { "hostname": "benjy", "user": " ", "friend": "prongs" },
                {}, {}, {}
            ]
        ],
        "num_machines": 20,
        "num_free": 6,
        "low_availability": false,
        "last_update": "1998-05-02 13:37"
    })
}
