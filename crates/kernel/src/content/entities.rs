//! Entity descriptors for every content table.

use crate::query::{Column, ColumnType, EntityDescriptor, OrderBy, Relation};

const ID: Column = Column::new("id", ColumnType::BigInt)
    .filterable()
    .read_only();
const ADDED_BY: Column = Column::new("added_by", ColumnType::BigInt)
    .filterable()
    .read_only();
const CREATED_AT: Column = Column::new("created_at", ColumnType::Timestamp).read_only();
const UPDATED_AT: Column = Column::new("updated_at", ColumnType::Timestamp).read_only();

const fn text(name: &'static str) -> Column {
    Column::new(name, ColumnType::Text)
}

/// Category name column shared by the three category tables.
const CATEGORY_NAME: Column = text("name").required().filterable().max_length(150);

pub static ARTICLE_CATEGORIES: EntityDescriptor = EntityDescriptor {
    name: "article_category",
    table: "article_categories",
    primary_key: "id",
    columns: &[ID, CATEGORY_NAME, CREATED_AT, UPDATED_AT],
    relations: &[],
    order: &[OrderBy::asc("name")],
};

pub static ARTICLES: EntityDescriptor = EntityDescriptor {
    name: "article",
    table: "articles",
    primary_key: "id",
    columns: &[
        ID,
        text("article_title").required().filterable(),
        text("slug").required().filterable(),
        Column::new("thumbnail", ColumnType::Attachment),
        text("article_description").required().filterable(),
        text("article_tags").filterable(),
        text("publish_time").required().filterable(),
        Column::new("article_category_id", ColumnType::BigInt)
            .required()
            .filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[Relation {
        name: "articleCategory",
        target: &ARTICLE_CATEGORIES,
        local_field: "article_category_id",
        default_fields: &["name", "created_at", "updated_at"],
    }],
    order: &[],
};

pub static ARTICLE_DETAILS: EntityDescriptor = EntityDescriptor {
    name: "article_detail",
    table: "article_details",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        Column::new("points", ColumnType::TextArray).required(),
        Column::new("photo", ColumnType::AttachmentList),
        text("description").required().filterable(),
        Column::new("article_id", ColumnType::BigInt)
            .required()
            .filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[Relation {
        name: "article",
        target: &ARTICLES,
        local_field: "article_id",
        default_fields: &["article_title", "slug"],
    }],
    order: &[],
};

pub static PROJECT_CATEGORIES: EntityDescriptor = EntityDescriptor {
    name: "project_category",
    table: "project_categories",
    primary_key: "id",
    columns: &[ID, CATEGORY_NAME, CREATED_AT, UPDATED_AT],
    relations: &[],
    order: &[OrderBy::asc("name")],
};

pub static PROJECTS: EntityDescriptor = EntityDescriptor {
    name: "project",
    table: "projects",
    primary_key: "id",
    columns: &[
        ID,
        text("project_title").required().filterable(),
        text("slug").required().filterable(),
        Column::new("thumbnail", ColumnType::Attachment),
        text("project_description").required().filterable(),
        text("project_tags").required().filterable(),
        text("publish_time").required().filterable(),
        Column::new("project_category_id", ColumnType::BigInt)
            .required()
            .filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[Relation {
        name: "projectCategory",
        target: &PROJECT_CATEGORIES,
        local_field: "project_category_id",
        default_fields: &["name", "created_at", "updated_at"],
    }],
    order: &[],
};

pub static PROJECT_DETAILS: EntityDescriptor = EntityDescriptor {
    name: "project_detail",
    table: "project_detail",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        Column::new("points", ColumnType::TextArray).required(),
        Column::new("photo", ColumnType::AttachmentList),
        text("description").required().filterable(),
        Column::new("project_id", ColumnType::BigInt)
            .required()
            .filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[Relation {
        name: "project",
        target: &PROJECTS,
        local_field: "project_id",
        default_fields: &["project_title", "slug"],
    }],
    order: &[],
};

pub static RESEARCH_AND_PUBLICATIONS: EntityDescriptor = EntityDescriptor {
    name: "research_and_publication",
    table: "research_and_publications",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        text("publisher").required().filterable(),
        Column::new("thumbnail", ColumnType::Attachment),
        text("journal").required().filterable(),
        text("doi").required().filterable(),
        text("tags").required().filterable(),
        text("paper_link").required(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static SECTION_DESCRIPTIONS: EntityDescriptor = EntityDescriptor {
    name: "section_description",
    table: "section_descriptions",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        text("description").required().filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static SEND_MESSAGES: EntityDescriptor = EntityDescriptor {
    name: "send_message",
    table: "send_messages",
    primary_key: "id",
    columns: &[
        ID,
        text("name").required().filterable(),
        Column::new("email", ColumnType::Email)
            .required()
            .filterable(),
        text("description").required().filterable(),
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static COLLABORATE: EntityDescriptor = EntityDescriptor {
    name: "collaborate",
    table: "collaborate",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required(),
        text("description").required(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static SKILLS_CATEGORIES: EntityDescriptor = EntityDescriptor {
    name: "skills_category",
    table: "skills_categories",
    primary_key: "id",
    columns: &[ID, CATEGORY_NAME, CREATED_AT, UPDATED_AT],
    relations: &[],
    order: &[OrderBy::asc("name")],
};

pub static SKILLS: EntityDescriptor = EntityDescriptor {
    name: "skill",
    table: "skills",
    primary_key: "id",
    columns: &[
        ID,
        text("skill_title").required().filterable(),
        Column::new("skill_amount", ColumnType::Integer)
            .required()
            .filterable(),
        Column::new("skills_category_id", ColumnType::BigInt)
            .required()
            .filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[Relation {
        name: "skillsCategory",
        target: &SKILLS_CATEGORIES,
        local_field: "skills_category_id",
        default_fields: &["name"],
    }],
    order: &[],
};

pub static PROFESSORS: EntityDescriptor = EntityDescriptor {
    name: "professor",
    table: "professors",
    primary_key: "id",
    columns: &[
        ID,
        text("professor_name").required().filterable(),
        text("department").required().filterable(),
        text("institute").required().filterable(),
        text("title").filterable(),
        text("description").filterable(),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static ABOUT_ME: EntityDescriptor = EntityDescriptor {
    name: "about_me",
    table: "about_me",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required(),
        text("description").required(),
        text("sub_title").required(),
        Column::new("skills", ColumnType::TextArray).required(),
        text("cv_link"),
        Column::new("photo", ColumnType::Attachment),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};

pub static EXPERIENCES: EntityDescriptor = EntityDescriptor {
    name: "experience",
    table: "experiences",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        text("organization").required().filterable(),
        text("location"),
        text("start_date").required().filterable(),
        text("end_date").filterable(),
        text("description"),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[OrderBy::desc("start_date")],
};

pub static HOME_ABOUT_SECTION: EntityDescriptor = EntityDescriptor {
    name: "home_about_section",
    table: "home_about_section",
    primary_key: "id",
    columns: &[
        ID,
        text("title").required().filterable(),
        text("description").required(),
        Column::new("thumbnail_image", ColumnType::Attachment),
        ADDED_BY,
        CREATED_AT,
        UPDATED_AT,
    ],
    relations: &[],
    order: &[],
};
